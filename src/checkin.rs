//! Bot-initiated check-in messages.
//!
//! After a random countdown the bot reaches out to every listened contact on
//! its own, unless the countdown ends inside quiet hours. Each fired check-in
//! is handed to the messaging layer through an mpsc channel; the prompt is the
//! configured check-in message, meant to be sent to the LLM in the contact's
//! context.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{BotConfig, CheckInConfig};
use crate::quiet_hours::QuietHours;

/// Longest countdown a check-in waits for.
const MAX_COUNTDOWN_HOURS: f64 = 24.0 * 365.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckIn {
    pub contact: String,
    pub prompt: String,
}

pub struct CheckInManager {
    min_hours: f64,
    max_hours: f64,
    quiet: QuietHours,
    contacts: Vec<String>,
    prompt: String,
    task: Option<JoinHandle<()>>,
    active: Arc<AtomicBool>,
    fired: Arc<AtomicU32>,
}

impl CheckInManager {
    pub fn new(checkin: &CheckInConfig, bot: &BotConfig, quiet: QuietHours) -> Self {
        let (min_hours, max_hours) = countdown_bounds(
            checkin.min_countdown_hours,
            checkin.max_countdown_hours,
        );
        if (min_hours, max_hours) != (checkin.min_countdown_hours, checkin.max_countdown_hours) {
            warn!(
                "Check-in countdown {}..{} hours adjusted to {min_hours}..{max_hours}",
                checkin.min_countdown_hours, checkin.max_countdown_hours
            );
        }

        Self {
            min_hours,
            max_hours,
            quiet,
            contacts: bot.listen_list.clone(),
            prompt: checkin.message.clone(),
            task: None,
            active: Arc::new(AtomicBool::new(false)),
            fired: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    /// Uniformly random countdown between the configured bounds.
    pub fn next_countdown(&self) -> Duration {
        countdown_between(self.min_hours, self.max_hours)
    }

    /// Start the countdown loop. Cancels any running loop first.
    pub fn start(&mut self, events: mpsc::Sender<CheckIn>) {
        self.cancel();
        self.active.store(true, Ordering::Relaxed);

        let active = self.active.clone();
        let fired = self.fired.clone();
        let (min_hours, max_hours) = (self.min_hours, self.max_hours);
        let quiet = self.quiet;
        let contacts = self.contacts.clone();
        let prompt = self.prompt.clone();

        let handle = tokio::spawn(async move {
            loop {
                let countdown = countdown_between(min_hours, max_hours);
                info!("Next check-in in {:.1} minutes", countdown.as_secs_f64() / 60.0);
                tokio::time::sleep(countdown).await;
                if !active.load(Ordering::Relaxed) {
                    break;
                }

                let now = Local::now().time();
                if quiet.contains(now) {
                    info!("Quiet hours at {}, skipping check-in", now.format("%H:%M"));
                    continue;
                }

                for contact in &contacts {
                    let event = CheckIn {
                        contact: contact.clone(),
                        prompt: prompt.clone(),
                    };
                    if events.send(event).await.is_err() {
                        debug!("Check-in receiver closed, stopping");
                        active.store(false, Ordering::Relaxed);
                        return;
                    }
                }
                let n = fired.fetch_add(1, Ordering::Relaxed) + 1;
                info!("Check-in #{n} sent to {} contacts", contacts.len());
            }
        });

        self.task = Some(handle);
    }

    /// Stop the countdown loop. Returns how many check-ins fired.
    pub fn cancel(&mut self) -> u32 {
        self.active.store(false, Ordering::Relaxed);
        if let Some(handle) = self.task.take() {
            handle.abort();
        }
        self.fired.swap(0, Ordering::Relaxed)
    }
}

/// Clamp one bound into `0..=MAX_COUNTDOWN_HOURS`. NaN counts as zero.
fn clamp_hours(hours: f64) -> f64 {
    if hours.is_nan() {
        0.0
    } else {
        hours.clamp(0.0, MAX_COUNTDOWN_HOURS)
    }
}

/// Clamped bounds, smaller first.
fn countdown_bounds(min_hours: f64, max_hours: f64) -> (f64, f64) {
    let (a, b) = (clamp_hours(min_hours), clamp_hours(max_hours));
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn countdown_between(min_hours: f64, max_hours: f64) -> Duration {
    let (min_hours, max_hours) = countdown_bounds(min_hours, max_hours);
    let hours = if max_hours > min_hours {
        rand::thread_rng().gen_range(min_hours..=max_hours)
    } else {
        min_hours
    };
    Duration::try_from_secs_f64(hours * 3600.0).unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(min: f64, max: f64, quiet: QuietHours) -> CheckInManager {
        let checkin = CheckInConfig {
            message: "say hi".into(),
            min_countdown_hours: min,
            max_countdown_hours: max,
        };
        let bot = BotConfig {
            listen_list: vec!["Ziggy".into(), "Mo".into()],
            ..BotConfig::default()
        };
        CheckInManager::new(&checkin, &bot, quiet)
    }

    fn never_quiet() -> QuietHours {
        QuietHours::parse("00:00", "00:00").unwrap()
    }

    #[test]
    fn countdown_stays_within_bounds() {
        let mgr = manager(1.0, 3.0, never_quiet());
        for _ in 0..200 {
            let secs = mgr.next_countdown().as_secs_f64();
            assert!((3600.0..=3.0 * 3600.0).contains(&secs), "{secs}");
        }
    }

    #[test]
    fn reversed_bounds_are_swapped() {
        let mgr = manager(3.0, 1.0, never_quiet());
        for _ in 0..50 {
            let secs = mgr.next_countdown().as_secs_f64();
            assert!((3600.0..=3.0 * 3600.0).contains(&secs), "{secs}");
        }
    }

    #[test]
    fn equal_bounds_are_fixed() {
        let mgr = manager(2.0, 2.0, never_quiet());
        assert_eq!(mgr.next_countdown(), Duration::from_secs(7200));
    }

    #[test]
    fn oversized_bounds_are_clamped() {
        let ceiling = Duration::from_secs_f64(MAX_COUNTDOWN_HOURS * 3600.0);

        let mgr = manager(1.0, 1e300, never_quiet());
        for _ in 0..50 {
            let countdown = mgr.next_countdown();
            assert!(countdown >= Duration::from_secs(3600) && countdown <= ceiling);
        }

        assert!(countdown_between(1.0, 1e300) <= ceiling);
        assert_eq!(countdown_between(f64::MAX, f64::MAX), ceiling);
    }

    #[test]
    fn non_finite_bounds_are_clamped() {
        let ceiling = Duration::from_secs_f64(MAX_COUNTDOWN_HOURS * 3600.0);

        let mgr = manager(f64::NAN, f64::INFINITY, never_quiet());
        assert!(mgr.next_countdown() <= ceiling);

        assert_eq!(countdown_between(f64::NAN, f64::NAN), Duration::ZERO);
        assert_eq!(countdown_between(f64::NEG_INFINITY, -5.0), Duration::ZERO);
        assert_eq!(countdown_between(f64::INFINITY, f64::INFINITY), ceiling);
    }

    #[tokio::test]
    async fn fires_for_every_contact() {
        // about 36ms
        let mut mgr = manager(0.00001, 0.00001, never_quiet());
        let (tx, mut rx) = mpsc::channel(8);
        mgr.start(tx);
        assert!(mgr.is_active());

        let wait = Duration::from_secs(5);
        let first = tokio::time::timeout(wait, rx.recv()).await.unwrap().unwrap();
        let second = tokio::time::timeout(wait, rx.recv()).await.unwrap().unwrap();
        let expected = CheckIn {
            contact: "Ziggy".into(),
            prompt: "say hi".into(),
        };
        assert_eq!(first, expected);
        assert_eq!(second.contact, "Mo");

        mgr.cancel();
        assert!(!mgr.is_active());
    }

    #[tokio::test]
    async fn quiet_hours_suppress_check_ins() {
        let always_quiet = QuietHours::parse("00:00", "24:00").unwrap();
        let mut mgr = manager(0.00001, 0.00001, always_quiet);
        let (tx, mut rx) = mpsc::channel(8);
        mgr.start(tx);

        let received = tokio::time::timeout(Duration::from_millis(300), rx.recv()).await;
        assert!(received.is_err(), "check-in sent during quiet hours");
        assert_eq!(mgr.cancel(), 0);
    }
}
