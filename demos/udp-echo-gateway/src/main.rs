mod logger;

use clap::{App, Arg};
use crossbeam::crossbeam_channel::TryRecvError;
use lan_rs_afpacket::RawLink;
use lan_rs_packets::MacAddr;
use lan_rs_stack::{runner, LanStack, NetConfig, SocketMode};
use log::{error, info, warn};
use std::net::Ipv4Addr;
use std::process;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

fn parse<T: FromStr>(value: Option<&str>, what: &str) -> T {
    match value.map(T::from_str) {
        Some(Ok(parsed)) => parsed,
        _ => {
            eprintln!("invalid {}: {}", what, value.unwrap_or(""));
            process::exit(2);
        }
    }
}

fn main() {
    let matches = App::new("UDP echo gateway")
        .version("0.1")
        .author("lan-rs Contributors")
        .about("Echoes UDP datagrams from one peer back to it, using the lan-rs stack over a raw socket")
        .arg(Arg::with_name("interface")
             .short("i")
             .long("interface")
             .value_name("IFACE")
             .help("Interface to bind the raw socket to")
             .required(true)
             .takes_value(true))
        .arg(Arg::with_name("peer")
             .short("p")
             .long("peer")
             .value_name("IP")
             .help("Only datagrams from this address are echoed")
             .required(true)
             .takes_value(true))
        .arg(Arg::with_name("port")
             .long("port")
             .value_name("PORT")
             .help("Local UDP port to echo on")
             .default_value("7")
             .takes_value(true))
        .arg(Arg::with_name("mac")
             .long("mac")
             .value_name("MAC")
             .help("MAC address of the stack; defaults to the interface's own")
             .takes_value(true))
        .arg(Arg::with_name("ip")
             .long("ip")
             .value_name("IP")
             .default_value("192.168.0.222")
             .takes_value(true))
        .arg(Arg::with_name("netmask")
             .long("netmask")
             .value_name("MASK")
             .default_value("255.255.255.0")
             .takes_value(true))
        .arg(Arg::with_name("gateway")
             .long("gateway")
             .value_name("IP")
             .default_value("192.168.0.1")
             .takes_value(true))
        .arg(Arg::with_name("announce")
             .long("announce")
             .value_name("PORT")
             .help("Send a HELLO datagram to this port on the peer at startup")
             .takes_value(true))
        .arg(Arg::with_name("log")
             .long("log")
             .value_name("LEVEL")
             .default_value("info")
             .possible_values(&["error", "warn", "info", "debug", "trace"])
             .takes_value(true))
        .get_matches();

    logger::init_logger(parse(matches.value_of("log"), "log level"));

    let iface = matches.value_of("interface").unwrap_or("eth0");
    let peer: Ipv4Addr = parse(matches.value_of("peer"), "peer address");
    let port: u16 = parse(matches.value_of("port"), "port");

    let mut link = match RawLink::open(iface) {
        Ok(link) => link,
        Err(err) => {
            error!("could not open {}: {}", iface, err);
            process::exit(1);
        }
    };

    let mac = match matches.value_of("mac") {
        Some(mac) => {
            if let Err(err) = link.set_promiscuous(true) {
                warn!("could not enable promiscuous mode: {}", err);
            }
            parse::<MacAddr>(Some(mac), "MAC address")
        }
        None => match link.hardware_addr(iface) {
            Ok(mac) => mac,
            Err(err) => {
                error!("could not read the MAC of {}: {}", iface, err);
                process::exit(1);
            }
        },
    };

    let config = NetConfig::new()
        .mac(mac)
        .ip(parse(matches.value_of("ip"), "address"))
        .netmask(parse(matches.value_of("netmask"), "netmask"))
        .gateway(parse(matches.value_of("gateway"), "gateway"));
    info!("{} is {} / {}", iface, config.mac, config.ip);

    let stack = Arc::new(LanStack::new(config, link));
    let stop = Arc::new(AtomicBool::new(false));
    let fatal = stack.fatal_signal();

    let runner = {
        let stack = Arc::clone(&stack);
        let stop = Arc::clone(&stop);
        thread::spawn(move || runner::run(stack, stop))
    };

    if let Some(announce) = matches.value_of("announce") {
        let announce: u16 = parse(Some(announce), "announce port");
        let hello = stack.bind(peer, announce, 0, SocketMode::WRITE);
        match hello.map(|socket| (socket, stack.write(socket, b"HELLO"))) {
            Some((socket, result)) => {
                if let Err(err) = result {
                    warn!("announce failed: {}", err);
                }
                stack.close(socket);
            }
            None => warn!("no socket free for the announce"),
        }
    }

    // The remote port is a wildcard until the first datagram pins it, after which writes go
    // back to the sender.
    let echo = match stack.bind(peer, 0, port, SocketMode::READ | SocketMode::WRITE) {
        Some(socket) => socket,
        None => {
            error!("no socket free for the echo port");
            process::exit(1);
        }
    };
    info!("echoing datagrams from {} on port {}", peer, port);

    let mut buf = vec![0; lan_rs_stack::stack::MAX_UDP_PAYLOAD];
    loop {
        match fatal.try_recv() {
            Err(TryRecvError::Empty) => {}
            Ok(err) => {
                error!("stack halted: {}", err);
                break;
            }
            Err(TryRecvError::Disconnected) => break,
        }

        let len = stack.read(echo, &mut buf);
        if len == 0 {
            continue;
        }
        if let Err(err) = stack.write(echo, &buf[..len]) {
            warn!("echo failed: {}", err);
        }
    }

    stop.store(true, Ordering::Relaxed);
    match runner.join() {
        Ok(Ok(())) => {}
        Ok(Err(err)) => error!("runner: {}", err),
        Err(_) => error!("runner thread panicked"),
    }
    process::exit(1);
}
