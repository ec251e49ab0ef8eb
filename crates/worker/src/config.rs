//! Worker configuration loaded from environment variables.

use std::time::Duration;

use callsync_core::phone::PhoneNormalizer;
use callsync_core::types::DbId;
use callsync_sync::SyncSettings;
use callsync_upstream::RetryPolicy;
use chrono::FixedOffset;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// One background sync scope, e.g. `admin` or `user:7`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncScope {
    pub key: String,
    /// Owner the scope is limited to; `None` syncs everyone's campaigns.
    pub user_id: Option<DbId>,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub campaign_api_url: String,
    pub campaign_api_key: String,
    pub carrier_api_url: String,
    pub carrier_api_key: String,
    pub carrier_api_token: String,
    pub carrier_offset: FixedOffset,
    pub phone_country_code: String,
    pub phone_national_length: usize,
    pub upstream_timeout: Duration,
    pub sync_cooldown: Duration,
    pub sync_interval: Duration,
    pub sync_scopes: Vec<SyncScope>,
    pub default_owner: DbId,
    pub campaign_page_size: u32,
    pub campaign_max_pages: u32,
    pub log_page_size: u32,
    pub log_max_pages: u32,
    pub recording_window: Duration,
    pub recording_batch_size: usize,
    /// Provisioned numbers whose inbound calls are pulled.
    pub incoming_numbers: Vec<String>,
    pub incoming_lookback: chrono::Duration,
}

impl WorkerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                       | Default    |
    /// |-------------------------------|------------|
    /// | `DATABASE_URL`                | required   |
    /// | `CAMPAIGN_API_URL`            | required   |
    /// | `CAMPAIGN_API_KEY`            | required   |
    /// | `CARRIER_API_URL`             | required   |
    /// | `CARRIER_API_KEY`             | required   |
    /// | `CARRIER_API_TOKEN`           | required   |
    /// | `CARRIER_UTC_OFFSET_MINUTES`  | `330`      |
    /// | `PHONE_COUNTRY_CODE`          | `91`       |
    /// | `PHONE_NATIONAL_LENGTH`       | `10`       |
    /// | `UPSTREAM_TIMEOUT_SECS`       | `20`       |
    /// | `SYNC_COOLDOWN_SECS`          | `60`       |
    /// | `SYNC_INTERVAL_SECS`          | `300`      |
    /// | `SYNC_SCOPES`                 | `admin`    |
    /// | `SYNC_DEFAULT_OWNER`          | `1`        |
    /// | `CAMPAIGN_PAGE_SIZE`          | `25`       |
    /// | `CAMPAIGN_MAX_PAGES`          | `10`       |
    /// | `LOG_PAGE_SIZE`               | `50`       |
    /// | `LOG_MAX_PAGES`               | `10`       |
    /// | `RECORDING_WINDOW_SECS`       | `900`      |
    /// | `RECORDING_BATCH_SIZE`        | `5`        |
    /// | `INCOMING_NUMBERS`            | (none)     |
    /// | `INCOMING_LOOKBACK_HOURS`     | `24`       |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env { lookup: &lookup };

        let offset_minutes: i32 = env.parsed("CARRIER_UTC_OFFSET_MINUTES", 330)?;
        let carrier_offset = offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| ConfigError::Invalid {
                var: "CARRIER_UTC_OFFSET_MINUTES",
                value: offset_minutes.to_string(),
                reason: "offset out of range".into(),
            })?;

        let lookback_hours: i64 = env.parsed("INCOMING_LOOKBACK_HOURS", 24)?;
        let incoming_lookback = chrono::Duration::try_hours(lookback_hours)
            .filter(|d| *d > chrono::Duration::zero())
            .ok_or_else(|| ConfigError::Invalid {
                var: "INCOMING_LOOKBACK_HOURS",
                value: lookback_hours.to_string(),
                reason: "must be a positive number of hours in range".into(),
            })?;

        Ok(Self {
            database_url: env.required("DATABASE_URL")?,
            campaign_api_url: env.required("CAMPAIGN_API_URL")?,
            campaign_api_key: env.required("CAMPAIGN_API_KEY")?,
            carrier_api_url: env.required("CARRIER_API_URL")?,
            carrier_api_key: env.required("CARRIER_API_KEY")?,
            carrier_api_token: env.required("CARRIER_API_TOKEN")?,
            carrier_offset,
            phone_country_code: env.get("PHONE_COUNTRY_CODE").unwrap_or_else(|| "91".into()),
            phone_national_length: env.parsed("PHONE_NATIONAL_LENGTH", 10)?,
            upstream_timeout: env.positive_secs("UPSTREAM_TIMEOUT_SECS", 20)?,
            sync_cooldown: Duration::from_secs(env.parsed("SYNC_COOLDOWN_SECS", 60)?),
            sync_interval: env.positive_secs("SYNC_INTERVAL_SECS", 300)?,
            sync_scopes: parse_scopes(&env.get("SYNC_SCOPES").unwrap_or_else(|| "admin".into()))?,
            default_owner: env.parsed("SYNC_DEFAULT_OWNER", 1)?,
            campaign_page_size: env.parsed("CAMPAIGN_PAGE_SIZE", 25)?,
            campaign_max_pages: env.parsed("CAMPAIGN_MAX_PAGES", 10)?,
            log_page_size: env.parsed("LOG_PAGE_SIZE", 50)?,
            log_max_pages: env.parsed("LOG_MAX_PAGES", 10)?,
            recording_window: Duration::from_secs(env.parsed("RECORDING_WINDOW_SECS", 900)?),
            recording_batch_size: env.parsed("RECORDING_BATCH_SIZE", 5)?,
            incoming_numbers: split_list(&env.get("INCOMING_NUMBERS").unwrap_or_default()),
            incoming_lookback,
        })
    }

    /// Engine settings derived from this configuration.
    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            phones: PhoneNormalizer::new(&self.phone_country_code, self.phone_national_length),
            default_owner: self.default_owner,
            cooldown: self.sync_cooldown,
            campaign_page_size: self.campaign_page_size,
            campaign_max_pages: self.campaign_max_pages,
            log_page_size: self.log_page_size,
            log_max_pages: self.log_max_pages,
            recording_window: self.recording_window,
            recording_batch_size: self.recording_batch_size,
            detail_retry: RetryPolicy::default(),
        }
    }
}

struct Env<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl Env<'_> {
    fn get(&self, var: &str) -> Option<String> {
        (self.lookup)(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, var: &'static str) -> Result<String, ConfigError> {
        self.get(var).ok_or(ConfigError::Missing(var))
    }

    fn parsed<T>(&self, var: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(var) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
                var,
                reason: e.to_string(),
                value,
            }),
        }
    }

    /// Whole seconds, zero rejected.
    fn positive_secs(&self, var: &'static str, default: u64) -> Result<Duration, ConfigError> {
        match self.parsed(var, default)? {
            0 => Err(ConfigError::Invalid {
                var,
                value: "0".into(),
                reason: "must be greater than zero".into(),
            }),
            secs => Ok(Duration::from_secs(secs)),
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// `admin,user:7` -> admin (everyone), user:7 (owner 7).
fn parse_scopes(raw: &str) -> Result<Vec<SyncScope>, ConfigError> {
    split_list(raw)
        .into_iter()
        .map(|key| {
            let user_id = match key.rsplit_once(':') {
                Some((_, id)) => Some(id.parse::<DbId>().map_err(|e| ConfigError::Invalid {
                    var: "SYNC_SCOPES",
                    value: key.clone(),
                    reason: e.to_string(),
                })?),
                None => None,
            };
            Ok(SyncScope { key, user_id })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::HashMap;

    fn required() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("DATABASE_URL", "postgres://localhost/callsync"),
            ("CAMPAIGN_API_URL", "https://campaigns.example/v1"),
            ("CAMPAIGN_API_KEY", "ck"),
            ("CARRIER_API_URL", "https://carrier.example/v1/Accounts/acme"),
            ("CARRIER_API_KEY", "key"),
            ("CARRIER_API_TOKEN", "token"),
        ])
    }

    fn load(vars: HashMap<&'static str, &'static str>) -> Result<WorkerConfig, ConfigError> {
        WorkerConfig::from_lookup(|var| vars.get(var).map(|v| v.to_string()))
    }

    #[test]
    fn defaults_apply() {
        let config = load(required()).unwrap();
        assert_eq!(config.carrier_offset.local_minus_utc(), 330 * 60);
        assert_eq!(config.sync_cooldown, Duration::from_secs(60));
        assert_eq!(config.sync_interval, Duration::from_secs(300));
        assert_eq!(
            config.sync_scopes,
            vec![SyncScope {
                key: "admin".into(),
                user_id: None
            }]
        );
        assert!(config.incoming_numbers.is_empty());

        let settings = config.sync_settings();
        assert_eq!(settings.campaign_page_size, 25);
        assert_eq!(settings.log_page_size, 50);
        assert_eq!(settings.recording_batch_size, 5);
        assert_eq!(settings.phones.country_code(), "91");
    }

    #[test]
    fn missing_required_variable() {
        let mut vars = required();
        vars.remove("CAMPAIGN_API_KEY");
        assert_matches!(load(vars), Err(ConfigError::Missing("CAMPAIGN_API_KEY")));
    }

    #[test]
    fn unparsable_number_is_an_error() {
        let mut vars = required();
        vars.insert("LOG_PAGE_SIZE", "fifty");
        assert_matches!(
            load(vars),
            Err(ConfigError::Invalid {
                var: "LOG_PAGE_SIZE",
                ..
            })
        );
    }

    #[test]
    fn scopes_and_numbers_are_lists() {
        let mut vars = required();
        vars.insert("SYNC_SCOPES", "admin, user:7 ,");
        vars.insert("INCOMING_NUMBERS", "08045678901, +918045678902");
        let config = load(vars).unwrap();
        assert_eq!(config.sync_scopes.len(), 2);
        assert_eq!(config.sync_scopes[1].key, "user:7");
        assert_eq!(config.sync_scopes[1].user_id, Some(7));
        assert_eq!(config.incoming_numbers, vec!["08045678901", "+918045678902"]);
    }

    #[test]
    fn scope_with_bad_owner_is_rejected() {
        let mut vars = required();
        vars.insert("SYNC_SCOPES", "user:abc");
        assert_matches!(load(vars), Err(ConfigError::Invalid { var: "SYNC_SCOPES", .. }));
    }

    #[test]
    fn offset_out_of_range_is_rejected() {
        let mut vars = required();
        vars.insert("CARRIER_UTC_OFFSET_MINUTES", "100000");
        assert_matches!(load(vars), Err(ConfigError::Invalid { .. }));

        let mut vars = required();
        vars.insert("CARRIER_UTC_OFFSET_MINUTES", "2147483647");
        assert_matches!(
            load(vars),
            Err(ConfigError::Invalid { var: "CARRIER_UTC_OFFSET_MINUTES", .. })
        );
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut vars = required();
        vars.insert("SYNC_INTERVAL_SECS", "0");
        assert_matches!(load(vars), Err(ConfigError::Invalid { var: "SYNC_INTERVAL_SECS", .. }));

        let mut vars = required();
        vars.insert("UPSTREAM_TIMEOUT_SECS", "0");
        assert_matches!(
            load(vars),
            Err(ConfigError::Invalid { var: "UPSTREAM_TIMEOUT_SECS", .. })
        );
    }

    #[test]
    fn lookback_out_of_range_is_rejected() {
        let mut vars = required();
        vars.insert("INCOMING_LOOKBACK_HOURS", "9223372036854775807");
        assert_matches!(
            load(vars),
            Err(ConfigError::Invalid { var: "INCOMING_LOOKBACK_HOURS", .. })
        );

        let mut vars = required();
        vars.insert("INCOMING_LOOKBACK_HOURS", "0");
        assert_matches!(
            load(vars),
            Err(ConfigError::Invalid { var: "INCOMING_LOOKBACK_HOURS", .. })
        );

        let mut vars = required();
        vars.insert("INCOMING_LOOKBACK_HOURS", "48");
        assert_eq!(load(vars).unwrap().incoming_lookback, chrono::Duration::hours(48));
    }
}
