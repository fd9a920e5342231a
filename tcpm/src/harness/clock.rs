//! A virtual millisecond clock.
//!
//! Time only moves while a timer waits. A waiting timer jumps the clock to the next point of interest, which
//! is the earliest of its own deadline, the deadlines of other live timers and the next scheduled event.
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::vec::Vec;

use crate::timers::Timer;

#[derive(Default)]
struct Clock {
    now: u64,
    next_id: usize,
    timers: Vec<(usize, u64)>,
    events: Vec<u64>,
}

thread_local! {
    static CLOCK: RefCell<Clock> = RefCell::new(Clock::default());
}

/// The current time in milliseconds.
pub fn now() -> u64 {
    CLOCK.with(|clock| clock.borrow().now)
}

/// Start over at zero, without timers or events.
pub fn reset() {
    CLOCK.with(|clock| *clock.borrow_mut() = Clock::default());
}

/// Note an event at `at`, so that waiting timers stop there.
pub fn schedule(at: u64) {
    CLOCK.with(|clock| clock.borrow_mut().events.push(at));
}

/// Forget a scheduled event, after it was handled.
pub fn unschedule(at: u64) {
    CLOCK.with(|clock| {
        let mut clock = clock.borrow_mut();
        if let Some(index) = clock.events.iter().position(|&event| event == at) {
            clock.events.swap_remove(index);
        }
    });
}

/// A timer that runs on the virtual clock.
pub struct VirtualTimer;

impl Timer for VirtualTimer {
    async fn after_millis(milliseconds: u64) {
        Delay {
            milliseconds,
            registration: None,
        }
        .await
    }
}

struct Delay {
    milliseconds: u64,
    /// Identifier and deadline, once polled.
    registration: Option<(usize, u64)>,
}

impl Future for Delay {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let milliseconds = self.milliseconds;

        let expired = CLOCK.with(|clock| {
            let mut clock = clock.borrow_mut();
            let now = clock.now;

            let (id, deadline) = *self.registration.get_or_insert_with(|| {
                let id = clock.next_id;
                clock.next_id += 1;
                clock.timers.push((id, now + milliseconds));
                (id, now + milliseconds)
            });

            if now >= deadline {
                return true;
            }

            let target = clock
                .timers
                .iter()
                .filter(|&&(other, _)| other != id)
                .map(|&(_, other_deadline)| other_deadline)
                .chain(clock.events.iter().copied())
                .filter(|&at| at > now)
                .fold(deadline, u64::min);

            clock.now = target;
            target >= deadline
        });

        if expired {
            Poll::Ready(())
        } else {
            // Let other futures of the task observe the new time.
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

impl Drop for Delay {
    fn drop(&mut self) {
        if let Some((id, _)) = self.registration {
            // The clock is gone when the thread ends.
            let _ = CLOCK.try_with(|clock| clock.borrow_mut().timers.retain(|&(other, _)| other != id));
        }
    }
}

#[cfg(test)]
mod tests {
    use embassy_futures::select::{Either, select};

    use super::*;

    #[tokio::test]
    async fn test_timer_advances_clock() {
        reset();
        VirtualTimer::after_millis(30).await;
        assert_eq!(now(), 30);
    }

    #[tokio::test]
    async fn test_earliest_timer_wins() {
        reset();
        let result = select(VirtualTimer::after_millis(100), VirtualTimer::after_millis(40)).await;

        assert!(matches!(result, Either::Second(())));
        assert_eq!(now(), 40);
    }

    #[tokio::test]
    async fn test_stops_at_events() {
        reset();
        schedule(10);

        // A lone timer passes the event on its second poll.
        VirtualTimer::after_millis(25).await;
        assert_eq!(now(), 25);
    }
}
