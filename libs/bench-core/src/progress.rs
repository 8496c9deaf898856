use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Интервал (в сообщениях) между строками прогресса по умолчанию.
pub const DEFAULT_REPORT_EVERY: u64 = 10_000;

/// Общий счётчик отправленных сообщений для всех воркеров прогона.
///
/// Строка прогресса печатается каждый раз, когда сумма пересекает
/// границу, кратную `every`. Батчевые инкременты границу не пропускают.
#[derive(Debug)]
pub struct Progress {
    sent: AtomicU64,
    every: u64,
    started: Instant,
}

impl Progress {
    pub fn new(every: u64) -> Self {
        Self::starting_at(every, Instant::now())
    }

    pub fn starting_at(every: u64, started: Instant) -> Self {
        Self { sent: AtomicU64::new(0), every, started }
    }

    /// Учесть `n` сообщений. Возвращает новую сумму.
    pub fn add(&self, n: u64) -> u64 {
        if n == 0 {
            return self.total();
        }
        let prev = self.sent.fetch_add(n, Ordering::Relaxed);
        let total = prev + n;
        if crosses_boundary(prev, total, self.every) {
            let elapsed = self.started.elapsed();
            tracing::info!(
                sent = total,
                rate = format_args!("{:.0}", rate(total, elapsed)),
                "progress"
            );
        }
        total
    }

    pub fn total(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

fn crosses_boundary(prev: u64, total: u64, every: u64) -> bool {
    every > 0 && total / every > prev / every
}

/// Сообщений в секунду. Нулевое время даёт 0, а не бесконечность.
pub fn rate(count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 { count as f64 / secs } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_crossing() {
        assert!(crosses_boundary(9_999, 10_000, 10_000));
        assert!(crosses_boundary(9_950, 10_050, 10_000));
        assert!(!crosses_boundary(10_000, 10_100, 10_000));
        assert!(!crosses_boundary(0, 10_000, 0));
    }

    #[test]
    fn batched_adds_accumulate() {
        let progress = Progress::new(1_000);
        for _ in 0..7 {
            progress.add(300);
        }
        assert_eq!(progress.total(), 2_100);
        assert_eq!(progress.add(0), 2_100);
    }

    #[test]
    fn concurrent_adds() {
        let progress = std::sync::Arc::new(Progress::new(DEFAULT_REPORT_EVERY));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let p = progress.clone();
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        p.add(1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(progress.total(), 8_000);
    }

    #[test]
    fn rate_is_count_over_seconds() {
        assert_eq!(rate(50_000, Duration::from_secs(2)), 25_000.0);
        assert_eq!(rate(1, Duration::ZERO), 0.0);
    }
}
