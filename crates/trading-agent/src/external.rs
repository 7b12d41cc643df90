use analysis_core::Bar;
use chrono::{DateTime, Timelike, Utc};

/// An upcoming economic event relevant to a currency.
#[derive(Debug, Clone)]
pub struct NewsEvent {
    pub time: DateTime<Utc>,
    pub currency: String,
    pub title: String,
}

/// Minimal economic-calendar interface. Source data quality is the
/// collaborator's problem; the default implementation reports nothing.
pub trait NewsCalendar: Send + Sync {
    fn upcoming_events(&self, impact_level: &str) -> Vec<NewsEvent>;
}

/// No-op calendar used when no feed is wired up.
pub struct NoNewsCalendar;

impl NewsCalendar for NoNewsCalendar {
    fn upcoming_events(&self, _impact_level: &str) -> Vec<NewsEvent> {
        Vec::new()
    }
}

/// Gates a signal on external market conditions: spread, session hours,
/// relative volume, and a news blackout window.
pub struct ExternalConditionFilter {
    max_spread_pips: f64,
    min_volume_ratio: f64,
    news_impact_level: String,
    news_blackout_mins: i64,
    calendar: Box<dyn NewsCalendar>,
}

impl ExternalConditionFilter {
    pub fn new(max_spread_pips: f64, min_volume_ratio: f64, news_impact_level: String) -> Self {
        Self {
            max_spread_pips,
            min_volume_ratio,
            news_impact_level,
            news_blackout_mins: 30,
            calendar: Box::new(NoNewsCalendar),
        }
    }

    pub fn with_calendar(mut self, calendar: Box<dyn NewsCalendar>) -> Self {
        self.calendar = calendar;
        self
    }

    /// All gates for one symbol. `Err` carries the blocking reason.
    pub fn check(
        &self,
        symbol: &str,
        spread_pips: f64,
        bars: &[Bar],
        now: DateTime<Utc>,
    ) -> Result<(), String> {
        if spread_pips > self.max_spread_pips {
            return Err(format!(
                "spread {:.1} pips above maximum {:.1}",
                spread_pips, self.max_spread_pips
            ));
        }
        self.check_session(now)?;
        self.check_volume(bars)?;
        self.check_news(symbol, now)?;
        Ok(())
    }

    /// Major sessions only: London through New York close, 07-21 UTC.
    fn check_session(&self, now: DateTime<Utc>) -> Result<(), String> {
        let hour = now.hour();
        if (7..=21).contains(&hour) {
            Ok(())
        } else {
            Err(format!("low liquidity period (hour {:02} UTC)", hour))
        }
    }

    /// Current volume against its 20-bar average. Fails open when the feed
    /// carries no volume.
    fn check_volume(&self, bars: &[Bar]) -> Result<(), String> {
        if bars.len() < 21 {
            return Ok(());
        }
        let current = bars[bars.len() - 1].volume;
        if current <= 0.0 {
            return Ok(());
        }
        let window = &bars[bars.len() - 21..bars.len() - 1];
        let avg = window.iter().map(|b| b.volume).sum::<f64>() / window.len() as f64;
        if avg <= 0.0 {
            return Ok(());
        }
        let ratio = current / avg;
        if ratio < self.min_volume_ratio {
            return Err(format!(
                "volume ratio {:.2} below minimum {:.2}",
                ratio, self.min_volume_ratio
            ));
        }
        Ok(())
    }

    /// Block trading within the blackout window around a high-impact event
    /// touching either leg of the pair.
    fn check_news(&self, symbol: &str, now: DateTime<Utc>) -> Result<(), String> {
        let symbol = symbol.to_ascii_uppercase();
        let base = symbol.get(0..3).unwrap_or_default();
        let quote = symbol.get(3..6).unwrap_or_default();

        for event in self.calendar.upcoming_events(&self.news_impact_level) {
            let currency = event.currency.to_ascii_uppercase();
            if currency != base && currency != quote {
                continue;
            }
            let minutes = (event.time - now).num_minutes().abs();
            if minutes <= self.news_blackout_mins {
                return Err(format!(
                    "news blackout: '{}' for {} at {}",
                    event.title,
                    currency,
                    event.time.format("%H:%M")
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn bars_with_volumes(volumes: &[f64]) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 6, 3, 8, 0, 0).unwrap();
        volumes
            .iter()
            .enumerate()
            .map(|(i, &v)| Bar {
                timestamp: start + Duration::minutes(15 * i as i64),
                open: 1.1,
                high: 1.1003,
                low: 1.0997,
                close: 1.1,
                volume: v,
            })
            .collect()
    }

    fn session_time(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, hour, 30, 0).unwrap()
    }

    #[test]
    fn wide_spread_blocks() {
        let filter = ExternalConditionFilter::new(3.0, 0.75, "high".to_string());
        let bars = bars_with_volumes(&[1000.0; 25]);
        let err = filter
            .check("EURUSD", 5.0, &bars, session_time(12))
            .unwrap_err();
        assert!(err.contains("spread"));
    }

    #[test]
    fn off_session_hours_block() {
        let filter = ExternalConditionFilter::new(3.0, 0.75, "high".to_string());
        let bars = bars_with_volumes(&[1000.0; 25]);
        assert!(filter.check("EURUSD", 1.0, &bars, session_time(12)).is_ok());
        let err = filter
            .check("EURUSD", 1.0, &bars, session_time(3))
            .unwrap_err();
        assert!(err.contains("low liquidity"));
    }

    #[test]
    fn thin_volume_blocks_but_missing_volume_fails_open() {
        let filter = ExternalConditionFilter::new(3.0, 0.75, "high".to_string());

        let mut volumes = vec![1000.0; 25];
        *volumes.last_mut().unwrap() = 100.0;
        let err = filter
            .check("EURUSD", 1.0, &bars_with_volumes(&volumes), session_time(12))
            .unwrap_err();
        assert!(err.contains("volume ratio"));

        let mut volumes = vec![1000.0; 25];
        *volumes.last_mut().unwrap() = 0.0;
        assert!(filter
            .check("EURUSD", 1.0, &bars_with_volumes(&volumes), session_time(12))
            .is_ok());
    }

    struct OneEvent(NewsEvent);
    impl NewsCalendar for OneEvent {
        fn upcoming_events(&self, _impact_level: &str) -> Vec<NewsEvent> {
            vec![self.0.clone()]
        }
    }

    #[test]
    fn news_blackout_blocks_only_related_pairs() {
        let now = session_time(12);
        let event = NewsEvent {
            time: now + Duration::minutes(15),
            currency: "USD".to_string(),
            title: "NFP".to_string(),
        };
        let filter = ExternalConditionFilter::new(3.0, 0.75, "high".to_string())
            .with_calendar(Box::new(OneEvent(event.clone())));
        let bars = bars_with_volumes(&[1000.0; 25]);

        let err = filter.check("EURUSD", 1.0, &bars, now).unwrap_err();
        assert!(err.contains("news blackout"));

        // EURGBP carries neither leg of the USD event.
        assert!(filter.check("EURGBP", 1.0, &bars, now).is_ok());

        // The same event an hour away is outside the blackout window.
        let far_event = NewsEvent {
            time: now + Duration::minutes(90),
            ..event
        };
        let filter = ExternalConditionFilter::new(3.0, 0.75, "high".to_string())
            .with_calendar(Box::new(OneEvent(far_event)));
        assert!(filter.check("EURUSD", 1.0, &bars, now).is_ok());
    }
}
