use std::env;
use std::str::FromStr;
use tracing::warn;

/// Largest offset from UTC any civil timezone uses, in minutes.
const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub redis_url: Option<String>,
    pub mail_api_url: Option<String>,
    pub mail_api_key: Option<String>,
    pub mail_from: String,
    pub port: u16,
    pub clinic: ClinicSettings,
}

/// Scheduling knobs for the clinic the deployment serves.
#[derive(Debug, Clone, PartialEq)]
pub struct ClinicSettings {
    /// Fixed offset of clinic wall-clock time from UTC.
    pub utc_offset_minutes: i32,
    /// Spacing used when re-flowing a day after an actual finish is recorded.
    pub reflow_step_minutes: i64,
    pub reminder_lead_minutes: i64,
    pub lock_wait_ms: u64,
    pub lock_ttl_ms: u64,
    pub reminder_poll_seconds: u64,
}

impl Default for ClinicSettings {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 330,
            reflow_step_minutes: 15,
            reminder_lead_minutes: 20,
            lock_wait_ms: 2_000,
            lock_ttl_ms: 10_000,
            reminder_poll_seconds: 30,
        }
    }
}

impl ClinicSettings {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let mut utc_offset_minutes = parse_or("CLINIC_UTC_OFFSET_MINUTES", defaults.utc_offset_minutes);
        if utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
            warn!(
                "CLINIC_UTC_OFFSET_MINUTES={} is outside +/-14h, using default {}",
                utc_offset_minutes, defaults.utc_offset_minutes
            );
            utc_offset_minutes = defaults.utc_offset_minutes;
        }

        Self {
            utc_offset_minutes,
            reflow_step_minutes: positive_or("REFLOW_STEP_MINUTES", defaults.reflow_step_minutes),
            reminder_lead_minutes: parse_or("REMINDER_LEAD_MINUTES", defaults.reminder_lead_minutes),
            lock_wait_ms: parse_or("BOOKING_LOCK_WAIT_MS", defaults.lock_wait_ms),
            lock_ttl_ms: parse_or("BOOKING_LOCK_TTL_MS", defaults.lock_ttl_ms),
            reminder_poll_seconds: parse_or("REMINDER_POLL_SECONDS", defaults.reminder_poll_seconds),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            redis_url: env::var("REDIS_URL").ok().filter(|url| !url.is_empty()),
            mail_api_url: env::var("MAIL_API_URL").ok().filter(|url| !url.is_empty()),
            mail_api_key: env::var("MAIL_API_KEY").ok().filter(|key| !key.is_empty()),
            mail_from: env::var("MAIL_FROM")
                .unwrap_or_else(|_| "appointments@clinic.local".to_string()),
            port: parse_or("PORT", 3000),
            clinic: ClinicSettings::from_env(),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - falling back to in-memory stores");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_mail_configured(&self) -> bool {
        self.mail_api_url.is_some() && self.mail_api_key.is_some()
    }
}

fn parse_or<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display + Copy,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{}={:?} is not valid, using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

fn positive_or(key: &str, default: i64) -> i64 {
    let value = parse_or(key, default);
    if value <= 0 {
        warn!("{} must be positive, using default {}", key, default);
        return default;
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clinic_defaults_match_the_original_deployment() {
        let settings = ClinicSettings::default();
        assert_eq!(settings.utc_offset_minutes, 330);
        assert_eq!(settings.reflow_step_minutes, 15);
        assert_eq!(settings.reminder_lead_minutes, 20);
    }

    #[test]
    fn parse_or_falls_back_on_garbage() {
        env::set_var("SHARED_CONFIG_TEST_GARBAGE", "not-a-number");
        assert_eq!(parse_or("SHARED_CONFIG_TEST_GARBAGE", 42u64), 42);
        env::set_var("SHARED_CONFIG_TEST_GARBAGE", " 7 ");
        assert_eq!(parse_or("SHARED_CONFIG_TEST_GARBAGE", 42u64), 7);
        env::remove_var("SHARED_CONFIG_TEST_GARBAGE");
    }

    #[test]
    fn positive_or_rejects_zero() {
        env::set_var("SHARED_CONFIG_TEST_STEP", "0");
        assert_eq!(positive_or("SHARED_CONFIG_TEST_STEP", 15), 15);
        env::remove_var("SHARED_CONFIG_TEST_STEP");
    }
}
