//! Device trust tracking and user-agent classification.

use chrono::{DateTime, Utc};
use service_core::middleware::tracing::CorrelationId;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{Device, DeviceContext, DeviceHints, LoginHistoryEntry};
use crate::store::{DeviceStore, StoreResult};

pub const UNKNOWN: &str = "Unknown";

/// Platform, browser and OS derived from a user-agent string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAgentInfo {
    pub operating_system: String,
    pub browser: String,
    pub platform: String,
}

/// Case-insensitive substring classification. First match wins within each
/// field; OS is resolved before browser, browser before platform.
pub fn parse_user_agent(user_agent: &str) -> UserAgentInfo {
    let ua = user_agent.to_lowercase();

    // "android" UAs also contain "linux"
    let operating_system = if ua.contains("windows") {
        "Windows"
    } else if ua.contains("android") {
        "Android"
    } else if ua.contains("iphone") || ua.contains("ipad") || ua.contains("ios") {
        "iOS"
    } else if ua.contains("mac os") || ua.contains("macos") {
        "macOS"
    } else if ua.contains("linux") {
        "Linux"
    } else {
        UNKNOWN
    };

    // Only legacy "Edge/" UAs report Edge; Chromium Edge ("Edg/") reads as Chrome
    let browser = if ua.contains("chrome") && !ua.contains("edge") {
        "Chrome"
    } else if ua.contains("firefox") {
        "Firefox"
    } else if ua.contains("safari") && !ua.contains("chrome") {
        "Safari"
    } else if ua.contains("edge") {
        "Edge"
    } else {
        UNKNOWN
    };

    // iPad Safari carries "Mobile/", so it classifies as Mobile
    let platform = if ua.is_empty() {
        UNKNOWN
    } else if ua.contains("mobile") || ua.contains("android") || ua.contains("iphone") {
        "Mobile"
    } else if ua.contains("tablet") || ua.contains("ipad") {
        "Tablet"
    } else {
        "Desktop"
    };

    UserAgentInfo {
        operating_system: operating_system.to_string(),
        browser: browser.to_string(),
        platform: platform.to_string(),
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Resolve the device a request came from. Explicit hints win over the
/// user agent; a missing device id gets a fresh random one.
pub fn build_device_context(
    device_id: Option<&str>,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
    hints: &DeviceHints,
) -> DeviceContext {
    let parsed = parse_user_agent(user_agent.unwrap_or_default());

    let device_id = non_empty(hints.device_id.as_deref())
        .or_else(|| non_empty(device_id))
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    DeviceContext {
        device_id,
        ip_address: non_empty(ip_address),
        user_agent: non_empty(user_agent),
        platform: non_empty(hints.platform.as_deref()).unwrap_or(parsed.platform),
        browser: non_empty(hints.browser.as_deref()).unwrap_or(parsed.browser),
        operating_system: non_empty(hints.operating_system.as_deref())
            .unwrap_or(parsed.operating_system),
    }
}

#[derive(Clone)]
pub struct DeviceTracker {
    store: Arc<dyn DeviceStore>,
    trust_new_devices: bool,
}

impl DeviceTracker {
    pub fn new(store: Arc<dyn DeviceStore>, trust_new_devices: bool) -> Self {
        Self {
            store,
            trust_new_devices,
        }
    }

    /// No device record means untrusted.
    pub async fn is_trusted(&self, user_id: Uuid, device_id: &str) -> StoreResult<bool> {
        Ok(self
            .store
            .find_device(user_id, device_id)
            .await?
            .is_some_and(|d| d.is_trusted))
    }

    /// True iff no successful access exists for the pair.
    pub async fn is_new_device(&self, user_id: Uuid, device_id: &str) -> StoreResult<bool> {
        Ok(!self.store.has_successful_access(user_id, device_id).await?)
    }

    /// Trust flag a token minted right now would carry: the stored flag, or
    /// the new-device policy for a device never seen before.
    pub async fn resolve_trust(&self, user_id: Uuid, device_id: &str) -> StoreResult<bool> {
        match self.store.find_device(user_id, device_id).await? {
            Some(device) => Ok(device.is_trusted),
            None => Ok(self.trust_new_devices),
        }
    }

    /// Appends a login-history entry. Successful accesses also create or
    /// refresh the device record.
    pub async fn record_access(
        &self,
        user_id: Uuid,
        context: &DeviceContext,
        success: bool,
        failure_reason: Option<&str>,
        correlation_id: &CorrelationId,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        if success {
            self.store
                .touch_device(user_id, context, self.trust_new_devices, now)
                .await?;
        }

        self.store
            .append_login_history(LoginHistoryEntry {
                id: Uuid::new_v4(),
                user_id,
                device_id: context.device_id.clone(),
                ip_address: context.ip_address.clone(),
                user_agent: context.user_agent.clone(),
                platform: context.platform.clone(),
                browser: context.browser.clone(),
                operating_system: context.operating_system.clone(),
                success,
                failure_reason: failure_reason.map(str::to_string),
                correlation_id: Some(correlation_id.as_str().to_string()),
                occurred_utc: now,
            })
            .await?;

        tracing::debug!(
            user_id = %user_id,
            device_id = %context.device_id,
            success,
            "Device access recorded"
        );

        Ok(())
    }

    pub async fn mark_trusted(&self, user_id: Uuid, device_id: &str) -> StoreResult<bool> {
        self.store.mark_trusted(user_id, device_id).await
    }

    pub async fn list_devices(&self, user_id: Uuid) -> StoreResult<Vec<Device>> {
        self.store.list_devices(user_id).await
    }

    pub async fn login_history(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> StoreResult<Vec<LoginHistoryEntry>> {
        self.store.list_login_history(user_id, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const CHROME_WINDOWS: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) \
         AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
    const CHROME_ANDROID: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36";
    const EDGE_WINDOWS: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0";
    const EDGE_LEGACY: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/70.0.3538.102 Safari/537.36 Edge/18.19041";
    const SAFARI_IPAD: &str = "Mozilla/5.0 (iPad; CPU OS 17_0 like Mac OS X) AppleWebKit/605.1.15 \
         (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
    const FIREFOX_TABLET: &str = "Mozilla/5.0 (Tablet; rv:68.0) Gecko/68.0 Firefox/68.0";
    const FIREFOX_LINUX: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";

    fn info(os: &str, browser: &str, platform: &str) -> UserAgentInfo {
        UserAgentInfo {
            operating_system: os.to_string(),
            browser: browser.to_string(),
            platform: platform.to_string(),
        }
    }

    #[test]
    fn test_parse_user_agent() {
        assert_eq!(parse_user_agent(CHROME_WINDOWS), info("Windows", "Chrome", "Desktop"));
        assert_eq!(parse_user_agent(SAFARI_IPHONE), info("iOS", "Safari", "Mobile"));
        assert_eq!(parse_user_agent(CHROME_ANDROID), info("Android", "Chrome", "Mobile"));
        assert_eq!(parse_user_agent(FIREFOX_LINUX), info("Linux", "Firefox", "Desktop"));
    }

    #[test]
    fn test_edge_detection_only_matches_legacy_token() {
        assert_eq!(parse_user_agent(EDGE_WINDOWS), info("Windows", "Chrome", "Desktop"));
        assert_eq!(parse_user_agent(EDGE_LEGACY), info("Windows", "Edge", "Desktop"));
    }

    #[test]
    fn test_mobile_is_checked_before_tablet() {
        assert_eq!(parse_user_agent(SAFARI_IPAD), info("iOS", "Safari", "Mobile"));
        assert_eq!(parse_user_agent(FIREFOX_TABLET), info(UNKNOWN, "Firefox", "Tablet"));
    }

    #[test]
    fn test_bare_android_is_mobile() {
        assert_eq!(parse_user_agent("ANDROID"), info("Android", UNKNOWN, "Mobile"));
    }

    #[test]
    fn test_empty_user_agent_is_unknown() {
        assert_eq!(parse_user_agent(""), info(UNKNOWN, UNKNOWN, UNKNOWN));
    }

    #[test]
    fn test_hints_take_precedence() {
        let hints = DeviceHints {
            device_id: Some("d1".to_string()),
            platform: Some("Kiosk".to_string()),
            browser: None,
            operating_system: Some("  ".to_string()),
        };
        let ctx = build_device_context(Some("header-id"), Some("10.0.0.1"), Some(CHROME_WINDOWS), &hints);

        assert_eq!(ctx.device_id, "d1");
        assert_eq!(ctx.platform, "Kiosk");
        assert_eq!(ctx.browser, "Chrome");
        assert_eq!(ctx.operating_system, "Windows");
        assert_eq!(ctx.ip_address.as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn test_missing_device_id_is_generated() {
        let a = build_device_context(None, None, None, &DeviceHints::default());
        let b = build_device_context(Some(""), None, None, &DeviceHints::default());
        assert!(Uuid::parse_str(&a.device_id).is_ok());
        assert_ne!(a.device_id, b.device_id);
        assert_eq!(a.platform, UNKNOWN);
    }

    #[tokio::test]
    async fn test_new_device_until_successful_access() {
        let tracker = DeviceTracker::new(Arc::new(MemoryStore::new()), false);
        let user_id = Uuid::new_v4();
        let ctx = build_device_context(Some("d1"), None, Some(CHROME_WINDOWS), &DeviceHints::default());
        let cid = CorrelationId::new();
        let now = Utc::now();

        assert!(tracker.is_new_device(user_id, "d1").await.unwrap());

        tracker
            .record_access(user_id, &ctx, false, Some("InvalidCredentials"), &cid, now)
            .await
            .unwrap();
        assert!(tracker.is_new_device(user_id, "d1").await.unwrap());
        assert!(!tracker.is_trusted(user_id, "d1").await.unwrap());

        tracker.record_access(user_id, &ctx, true, None, &cid, now).await.unwrap();
        assert!(!tracker.is_new_device(user_id, "d1").await.unwrap());

        let history = tracker.login_history(user_id, 10).await.unwrap();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn test_trust_is_explicit_unless_policy_trusts() {
        let store = Arc::new(MemoryStore::new());
        let strict = DeviceTracker::new(store.clone(), false);
        let lenient = DeviceTracker::new(store, true);
        let user_id = Uuid::new_v4();
        let ctx = build_device_context(Some("d1"), None, None, &DeviceHints::default());
        let cid = CorrelationId::new();

        assert!(!strict.resolve_trust(user_id, "d1").await.unwrap());
        assert!(lenient.resolve_trust(user_id, "d1").await.unwrap());

        strict.record_access(user_id, &ctx, true, None, &cid, Utc::now()).await.unwrap();
        assert!(!strict.is_trusted(user_id, "d1").await.unwrap());

        assert!(strict.mark_trusted(user_id, "d1").await.unwrap());
        assert!(strict.is_trusted(user_id, "d1").await.unwrap());

        // a later access never lowers trust
        strict.record_access(user_id, &ctx, true, None, &cid, Utc::now()).await.unwrap();
        assert!(strict.is_trusted(user_id, "d1").await.unwrap());
    }
}
