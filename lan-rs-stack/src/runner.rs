use crate::driver::Driver;
use crate::error::LanError;
use crate::stack::{LanStack, PollOutcome};
use futures::future;
use log::{debug, error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::runtime;
use tokio::task;
use tokio::time::{self, Duration, Instant};

/// Period of the ARP aging tick.
pub const ARP_TICK: Duration = Duration::from_secs(1);

/// Sleep of the polling loop when the driver had nothing for us.
const IDLE_BACKOFF: Duration = Duration::from_millis(1);

/// Runs a stack until `stop` is set or the stack halts.
///
/// The polling loop runs as a blocking task, since driver calls and socket hand-offs are
/// synchronous, next to an async task that ages the ARP cache every `ARP_TICK`. Returns
/// `Err(LanError::Halted)` when the stack gave up after too many write failures, so the
/// caller can restart the device.
pub fn run<D: Driver + 'static>(stack: Arc<LanStack<D>>, stop: Arc<AtomicBool>) -> Result<(), LanError> {
    run_with_tick(stack, stop, ARP_TICK)
}

pub fn run_with_tick<D: Driver + 'static>(
    stack: Arc<LanStack<D>>,
    stop: Arc<AtomicBool>,
    tick: Duration,
) -> Result<(), LanError> {
    let mut runtime = runtime::Builder::new()
        .threaded_scheduler()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let poller = {
            let stack = Arc::clone(&stack);
            let stop = Arc::clone(&stop);
            task::spawn_blocking(move || poll_loop(&stack, &stop))
        };
        let ager = tokio::spawn(age_loop(Arc::clone(&stack), Arc::clone(&stop), tick));

        let (polled, aged) = future::join(poller, ager).await;
        for joined in vec![polled, aged] {
            if let Err(err) = joined {
                error!("runner task failed: {}", err);
            }
        }
    });

    match stack.halted() {
        Some(fatal) => Err(LanError::Halted(fatal)),
        None => {
            info!("runner stopped");
            Ok(())
        }
    }
}

fn poll_loop<D: Driver>(stack: &LanStack<D>, stop: &AtomicBool) {
    while !stop.load(Ordering::Relaxed) && stack.halted().is_none() {
        match stack.poll() {
            PollOutcome::Idle | PollOutcome::NoBuffer => thread::sleep(IDLE_BACKOFF),
            PollOutcome::Handled | PollOutcome::Consumed => {}
        }
    }
}

async fn age_loop<D: Driver + 'static>(
    stack: Arc<LanStack<D>>,
    stop: Arc<AtomicBool>,
    tick: Duration,
) {
    let mut ticks = time::interval_at(Instant::now() + tick, tick);
    loop {
        ticks.tick().await;
        if stop.load(Ordering::Relaxed) || stack.halted().is_some() {
            break;
        }
        let expired = stack.age_arp();
        if expired > 0 {
            debug!("arp: {} entries expired", expired);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetConfig;
    use crate::error::FatalError;
    use crate::socket::SocketMode;
    use crate::utils::test::capture_driver::capture_driver;
    use crate::utils::test::frame_generators::*;

    fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
        let deadline = std::time::Instant::now() + Duration::from_secs(3);
        while std::time::Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn polls_ages_and_stops() {
        let (driver, wire) = capture_driver();
        let config = NetConfig::new()
            .mac(OUR_MAC)
            .ip(OUR_IP)
            .arp_max_age(3);
        let stack = Arc::new(LanStack::new(config, driver));
        let stop = Arc::new(AtomicBool::new(false));
        wire.inject
            .send(arp_reply_to_us(PEER_IP, PEER_MAC))
            .unwrap();

        let runner = {
            let stack = Arc::clone(&stack);
            let stop = Arc::clone(&stop);
            thread::spawn(move || run_with_tick(stack, stop, Duration::from_millis(10)))
        };

        assert!(wait_until(|| stack.stats().frames_received == 1));
        assert!(wait_until(|| stack.arp_entries().is_empty()));

        stop.store(true, Ordering::Relaxed);
        assert!(runner.join().unwrap().is_ok());
    }

    #[test]
    fn halt_ends_the_run() {
        let (driver, wire) = capture_driver();
        let config = NetConfig::new().mac(OUR_MAC).ip(OUR_IP);
        let stack = Arc::new(LanStack::new(config, driver));
        let stop = Arc::new(AtomicBool::new(false));
        let runner = {
            let stack = Arc::clone(&stack);
            let stop = Arc::clone(&stop);
            thread::spawn(move || run_with_tick(stack, stop, Duration::from_millis(10)))
        };

        wire.set_link_down(true);
        let handle = stack
            .bind(stack.config().broadcast(), 9999, 0, SocketMode::WRITE)
            .unwrap();
        for _ in 0..4 {
            assert!(stack.write(handle, b"x").is_err());
        }

        match runner.join().unwrap() {
            Err(LanError::Halted(fatal)) => assert_eq!(
                fatal,
                FatalError {
                    consecutive_failures: 4
                }
            ),
            other => panic!("unexpected result {:?}", other),
        }
    }
}
