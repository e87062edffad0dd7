use std::time::Duration;

#[derive(Debug, Clone, Copy)]
enum Growth {
    Linear,
    /// Doubles each retry, capped at `base * 2^3`.
    Exponential,
}

/// Delay schedule between retries of a failed attempt.
#[derive(Debug)]
pub(crate) struct Backoff {
    base: Duration,
    max_retries: u32,
    attempt: u32,
    growth: Growth,
}

impl Backoff {
    pub(crate) fn linear(base: Duration, max_retries: u32) -> Self {
        Self {
            base,
            max_retries,
            attempt: 0,
            growth: Growth::Linear,
        }
    }

    pub(crate) fn exponential(base: Duration, max_retries: u32) -> Self {
        Self {
            base,
            max_retries,
            attempt: 0,
            growth: Growth::Exponential,
        }
    }

    pub(crate) fn next(&mut self) -> Duration {
        self.attempt += 1;
        match self.growth {
            Growth::Linear => self.base * self.attempt,
            Growth::Exponential => self.base * 2u32.pow((self.attempt - 1).min(3)),
        }
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.attempt >= self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_schedule() {
        let mut b = Backoff::linear(Duration::from_secs(1), 2);
        assert!(!b.is_exhausted());
        assert_eq!(b.next(), Duration::from_secs(1));
        assert_eq!(b.next(), Duration::from_secs(2));
        assert!(b.is_exhausted());
    }

    #[test]
    fn test_exponential_is_capped() {
        let mut b = Backoff::exponential(Duration::from_millis(500), 6);
        let delays: Vec<u64> = (0..6).map(|_| b.next().as_millis() as u64).collect();
        assert_eq!(delays, vec![500, 1000, 2000, 4000, 4000, 4000]);
        assert!(b.is_exhausted());
    }
}
