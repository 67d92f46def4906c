//! Macro execution. One engine owns the device session; every front-end
//! goes through [`MacroRunner`] so runs never interleave on the TV.

mod catalog;
mod executor;
mod result;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::device::{DeviceSession, WakeSignal};
use crate::error::EngineError;

pub use catalog::MacroCatalog;
pub use result::MacroResult;

use executor::RetryingExecutor;

/// What to do with a request that arrives while another run holds the TV.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusyPolicy {
    #[default]
    Reject,
    Wait,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    TurnedOff,
    /// The TV could not be reached, which for power-off means it is off.
    AlreadyOff,
}

/// Entry point shared by the CLI, the bot and the web panel.
pub trait MacroRunner: Send + Sync {
    fn run(&self, name: &str) -> Result<MacroResult, EngineError>;

    /// Send the wake signal only; no session, no lock.
    fn wake_only(&self) -> Result<(), EngineError>;

    fn power_off(&self) -> Result<PowerState, EngineError>;

    fn macro_names(&self) -> Vec<String>;
}

pub struct MacroEngine {
    catalog: Arc<MacroCatalog>,
    executor: Mutex<RetryingExecutor>,
    wake: Arc<dyn WakeSignal>,
    when_busy: BusyPolicy,
}

impl MacroEngine {
    pub fn new(
        catalog: Arc<MacroCatalog>,
        session: DeviceSession,
        wake: Arc<dyn WakeSignal>,
        grace: Duration,
        when_busy: BusyPolicy,
    ) -> Self {
        Self {
            catalog,
            executor: Mutex::new(RetryingExecutor::new(session, wake.clone(), grace)),
            wake,
            when_busy,
        }
    }

    fn lock_device(&self) -> Result<MutexGuard<'_, RetryingExecutor>, EngineError> {
        match self.when_busy {
            BusyPolicy::Wait => Ok(self
                .executor
                .lock()
                .unwrap_or_else(PoisonError::into_inner)),
            BusyPolicy::Reject => match self.executor.try_lock() {
                Ok(guard) => Ok(guard),
                Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
                Err(TryLockError::WouldBlock) => {
                    warn!("Another command is in progress; rejecting request");
                    Err(EngineError::Busy)
                }
            },
        }
    }
}

impl MacroRunner for MacroEngine {
    fn run(&self, name: &str) -> Result<MacroResult, EngineError> {
        let Some(m) = self.catalog.get(name) else {
            return Err(EngineError::UnknownMacro(name.to_string()));
        };

        let mut executor = self.lock_device()?;
        info!("Running '{}' ({} steps)", m.name, m.steps.len());

        let mut outcomes = Vec::with_capacity(m.steps.len());
        for (i, step) in m.steps.iter().enumerate() {
            debug!("[{}/{}] {}", i + 1, m.steps.len(), step.action);
            let outcome = executor.run_action(&step.action);
            let succeeded = outcome.is_success();
            outcomes.push(outcome);
            if !succeeded {
                break;
            }
            if !step.settle.is_zero() {
                std::thread::sleep(step.settle);
            }
        }
        executor.finish();

        let result = MacroResult::new(name, outcomes);
        match result.failure() {
            None => info!("'{}' completed", name),
            Some((step, outcome)) => error!(
                "'{}' stopped at step {} ({})",
                name, step, outcome.action
            ),
        }
        Ok(result)
    }

    fn wake_only(&self) -> Result<(), EngineError> {
        self.wake.wake()?;
        Ok(())
    }

    fn power_off(&self) -> Result<PowerState, EngineError> {
        let mut executor = self.lock_device()?;
        Ok(executor.power_off()?)
    }

    fn macro_names(&self) -> Vec<String> {
        self.catalog.names().map(str::to_string).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::catalog::{Macro, MacroStep};
    use super::*;
    use crate::device::{Action, ActionStatus};
    use crate::error::DeviceError;
    use crate::test_utils::{Event, FakeTv, FakeWaker, MemoryCredentialStore};

    fn channel_macro(name: &str, actions: Vec<Action>) -> Macro {
        Macro {
            name: name.to_string(),
            steps: actions.into_iter().map(MacroStep::new).collect(),
        }
    }

    fn engine(tv: &FakeTv, waker: Arc<FakeWaker>, when_busy: BusyPolicy) -> MacroEngine {
        let catalog = MacroCatalog::new([
            channel_macro(
                "channel_1",
                vec![
                    Action::press_button("HOME"),
                    Action::launch_app("X"),
                    Action::press_button("ENTER"),
                ],
            ),
            channel_macro(
                "channel_2",
                vec![Action::launch_app("X"), Action::press_button("Y")],
            ),
        ]);
        engine_with(tv, waker, when_busy, catalog)
    }

    fn engine_with(
        tv: &FakeTv,
        waker: Arc<FakeWaker>,
        when_busy: BusyPolicy,
        catalog: MacroCatalog,
    ) -> MacroEngine {
        let session = DeviceSession::new(
            Box::new(tv.clone()),
            Arc::new(MemoryCredentialStore::default()),
        );
        MacroEngine::new(
            Arc::new(catalog),
            session,
            waker,
            Duration::ZERO,
            when_busy,
        )
    }

    fn settling_macro(settle: Duration) -> MacroCatalog {
        MacroCatalog::new([Macro {
            name: "slow".to_string(),
            steps: ["HOME", "ENTER"]
                .into_iter()
                .map(|button| MacroStep {
                    action: Action::press_button(button),
                    settle,
                })
                .collect(),
        }])
    }

    #[test]
    fn test_reachable_device_runs_all_steps() {
        let tv = FakeTv::new();
        let waker = Arc::new(FakeWaker::new(tv.log()));
        let engine = engine(&tv, waker.clone(), BusyPolicy::Reject);

        let result = engine.run("channel_1").unwrap();

        assert!(result.is_success());
        assert_eq!(result.outcomes.len(), 3);
        assert!(!result.woke_device());
        assert_eq!(waker.count(), 0);
        assert_eq!(tv.events().last(), Some(&Event::Disconnect));
    }

    #[test]
    fn test_sleeping_device_is_woken_once() {
        let tv = FakeTv::asleep();
        let waker = Arc::new(FakeWaker::new(tv.log()).waking(&tv));
        let engine = engine(&tv, waker.clone(), BusyPolicy::Reject);

        let result = engine.run("channel_1").unwrap();

        assert!(result.is_success());
        assert!(result.outcomes[0].woke_device);
        assert!(!result.outcomes[1].woke_device);
        assert_eq!(waker.count(), 1);
        assert_eq!(
            tv.events(),
            vec![
                Event::Connect(None),
                Event::Wake,
                Event::Connect(None),
                Event::Send(Action::press_button("HOME")),
                Event::Send(Action::launch_app("X")),
                Event::Send(Action::press_button("ENTER")),
                Event::Disconnect,
            ]
        );
    }

    #[test]
    fn test_rejection_stops_macro() {
        let tv = FakeTv::new().rejecting_sends();
        let waker = Arc::new(FakeWaker::new(tv.log()));
        let engine = engine(&tv, waker.clone(), BusyPolicy::Reject);

        let result = engine.run("channel_2").unwrap();

        assert_eq!(result.status, ActionStatus::Failed);
        assert_eq!(result.outcomes.len(), 1);
        assert!(matches!(
            result.outcomes[0].error,
            Some(DeviceError::Rejected(_))
        ));
        assert!(!tv.events().contains(&Event::Send(Action::press_button("Y"))));
        assert_eq!(waker.count(), 0);
    }

    #[test]
    fn test_settle_follows_each_successful_step() {
        let tv = FakeTv::new();
        let waker = Arc::new(FakeWaker::new(tv.log()));
        let settle = Duration::from_millis(40);
        let engine = engine_with(&tv, waker, BusyPolicy::Reject, settling_macro(settle));

        let started = Instant::now();
        assert!(engine.run("slow").unwrap().is_success());

        assert!(started.elapsed() >= settle * 2);
    }

    #[test]
    fn test_no_settle_after_failed_step() {
        let tv = FakeTv::new().rejecting_sends();
        let waker = Arc::new(FakeWaker::new(tv.log()));
        let engine = engine_with(
            &tv,
            waker,
            BusyPolicy::Reject,
            settling_macro(Duration::from_secs(60)),
        );

        let started = Instant::now();
        let result = engine.run("slow").unwrap();

        assert!(!result.is_success());
        assert_eq!(result.outcomes.len(), 1);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_unreachable_device_fails_after_one_wake() {
        let tv = FakeTv::unreachable();
        let waker = Arc::new(FakeWaker::new(tv.log()));
        let engine = engine(&tv, waker.clone(), BusyPolicy::Reject);

        let result = engine.run("channel_1").unwrap();

        assert!(!result.is_success());
        assert_eq!(result.outcomes.len(), 1);
        assert_eq!(waker.count(), 1);
        assert_eq!(tv.connect_count(), 2);
    }

    #[test]
    fn test_unknown_macro_touches_nothing() {
        let tv = FakeTv::new();
        let waker = Arc::new(FakeWaker::new(tv.log()));
        let engine = engine(&tv, waker.clone(), BusyPolicy::Reject);

        let err = engine.run("channel_9").unwrap_err();

        assert_eq!(err, EngineError::UnknownMacro("channel_9".to_string()));
        assert!(tv.events().is_empty());
    }

    #[test]
    fn test_busy_rejected_while_locked() {
        let tv = FakeTv::new();
        let waker = Arc::new(FakeWaker::new(tv.log()));
        let engine = engine(&tv, waker, BusyPolicy::Reject);

        let guard = engine.lock_device().unwrap();
        assert_eq!(engine.run("channel_1").unwrap_err(), EngineError::Busy);
        assert_eq!(engine.power_off().unwrap_err(), EngineError::Busy);
        drop(guard);

        assert!(tv.events().is_empty());
        assert!(engine.run("channel_1").unwrap().is_success());
    }

    #[test]
    fn test_wait_policy_serializes_runs() {
        let tv = FakeTv::new();
        let waker = Arc::new(FakeWaker::new(tv.log()));
        let engine = Arc::new(engine(&tv, waker, BusyPolicy::Wait));

        let guard = engine.lock_device().unwrap();
        let worker = {
            let engine = engine.clone();
            std::thread::spawn(move || engine.run("channel_2"))
        };
        std::thread::sleep(Duration::from_millis(50));
        assert!(tv.events().is_empty());
        drop(guard);

        assert!(worker.join().unwrap().unwrap().is_success());
        assert_eq!(tv.connect_count(), 1);
    }

    #[test]
    fn test_concurrent_runs_do_not_interleave() {
        let tv = FakeTv::new();
        let waker = Arc::new(FakeWaker::new(tv.log()));
        let engine = Arc::new(engine(&tv, waker, BusyPolicy::Wait));

        let workers: Vec<_> = ["channel_1", "channel_2"]
            .into_iter()
            .map(|name| {
                let engine = engine.clone();
                std::thread::spawn(move || engine.run(name))
            })
            .collect();
        for worker in workers {
            assert!(worker.join().unwrap().unwrap().is_success());
        }

        // Each run is bracketed by its own connect and disconnect
        let events = tv.events();
        let mut open = false;
        for event in &events {
            match event {
                Event::Connect(_) => {
                    assert!(!open, "second session opened mid-run: {:?}", events);
                    open = true;
                }
                Event::Disconnect => open = false,
                Event::Send(_) => assert!(open),
                _ => {}
            }
        }
        assert_eq!(tv.connect_count(), 2);
    }

    #[test]
    fn test_wake_only_bypasses_session() {
        let tv = FakeTv::new();
        let waker = Arc::new(FakeWaker::new(tv.log()));
        let engine = engine(&tv, waker.clone(), BusyPolicy::Reject);

        engine.wake_only().unwrap();

        assert_eq!(tv.events(), vec![Event::Wake]);
        assert_eq!(tv.connect_count(), 0);
    }

    #[test]
    fn test_power_off_unreachable_is_already_off() {
        let tv = FakeTv::unreachable();
        let waker = Arc::new(FakeWaker::new(tv.log()));
        let engine = engine(&tv, waker.clone(), BusyPolicy::Reject);

        assert_eq!(engine.power_off().unwrap(), PowerState::AlreadyOff);
        assert_eq!(waker.count(), 0);
    }

    #[test]
    fn test_busy_policy_deserializes_lowercase() {
        #[derive(Deserialize)]
        struct Wrapper {
            when_busy: BusyPolicy,
        }
        let parsed: Wrapper = toml::from_str("when_busy = \"reject\"").unwrap();
        assert_eq!(parsed.when_busy, BusyPolicy::Reject);
        assert_eq!(BusyPolicy::default(), BusyPolicy::Reject);
    }
}
