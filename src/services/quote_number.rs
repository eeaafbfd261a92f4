use chrono::{DateTime, NaiveDate, Utc};
use rand::{distributions::Alphanumeric, Rng};
use std::sync::Mutex;

/// Produces human-legible, unique quote numbers.
pub trait QuoteNumberGenerator: Send + Sync {
    fn next_quote_no(&self) -> String;
}

/// `PREFIX-YYYYMMDD-NNNNNN-XXXX`: a per-day in-process sequence plus a random
/// suffix so numbers from separate processes do not collide.
pub struct DailySequenceGenerator {
    prefix: String,
    state: Mutex<(NaiveDate, u32)>,
}

impl DailySequenceGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            state: Mutex::new((NaiveDate::MIN, 0)),
        }
    }

    pub fn generate_at(&self, now: DateTime<Utc>) -> String {
        let today = now.date_naive();
        let seq = {
            let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            if state.0 != today {
                *state = (today, 0);
            }
            state.1 = (state.1 + 1) % 1_000_000;
            state.1
        };

        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(4)
            .map(|c| char::from(c).to_ascii_uppercase())
            .collect();

        format!(
            "{}-{}-{:06}-{}",
            self.prefix,
            today.format("%Y%m%d"),
            seq,
            suffix
        )
    }
}

impl QuoteNumberGenerator for DailySequenceGenerator {
    fn next_quote_no(&self) -> String {
        self.generate_at(Utc::now())
    }
}
