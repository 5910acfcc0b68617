use model::DeviceId;
use reqwest::Url;

/// Query key carrying the device identifier on the tracking page.
pub const DEVICE_QUERY_KEY: &str = "imei";

/// Tells the session manager which device should currently be tracked.
pub trait Locator: Send + Sync + 'static {
    fn current_device_identifier(&self) -> Option<DeviceId>;
}

/// Always reports the same device, or none.
#[derive(Debug, Clone, Default)]
pub struct FixedLocator(Option<DeviceId>);

impl FixedLocator {
    pub fn new(device: Option<DeviceId>) -> Self {
        Self(device)
    }
}

impl Locator for FixedLocator {
    fn current_device_identifier(&self) -> Option<DeviceId> {
        self.0.clone()
    }
}

/// Reads the device from the `imei` parameter of a page URL such as
/// `https://example.com/track?imei=356938035643809`, or of a bare query
/// string (`?imei=…`, `imei=…`).
#[derive(Debug, Clone)]
pub struct QueryLocator {
    page: String,
}

impl QueryLocator {
    pub fn new<S: Into<String>>(page: S) -> Self {
        Self { page: page.into() }
    }
}

impl Locator for QueryLocator {
    fn current_device_identifier(&self) -> Option<DeviceId> {
        device_from_query(&self.page)
    }
}

pub fn device_from_query(page: &str) -> Option<DeviceId> {
    let page = page.trim();
    let url = match Url::parse(page) {
        Ok(url) if url.has_host() || url.query().is_some() => url,
        _ => {
            let query = page.trim_start_matches('?');
            Url::parse(&format!("http://localhost/?{}", query)).ok()?
        }
    };
    url.query_pairs()
        .find(|(key, _)| key == DEVICE_QUERY_KEY)
        .and_then(|(_, value)| DeviceId::new(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_imei_from_page_url() {
        let locator = QueryLocator::new("https://gps.example.com/?imei=356938035643809&zoom=15");
        assert_eq!(
            locator.current_device_identifier(),
            DeviceId::new("356938035643809")
        );
    }

    #[test]
    fn reads_imei_from_bare_query() {
        assert_eq!(device_from_query("?imei=42"), DeviceId::new("42"));
        assert_eq!(device_from_query("zoom=3&imei=%2042%20"), DeviceId::new("42"));
    }

    #[test]
    fn missing_or_blank_identifier() {
        assert_eq!(device_from_query("https://gps.example.com/"), None);
        assert_eq!(device_from_query("?imei="), None);
        assert_eq!(device_from_query(""), None);
    }

    #[test]
    fn alternate_emi_key_is_not_honoured() {
        assert_eq!(device_from_query("?emi=356938035643809"), None);
    }

    #[test]
    fn fixed_locator() {
        assert_eq!(FixedLocator::default().current_device_identifier(), None);
        assert_eq!(
            FixedLocator::new(DeviceId::new("7")).current_device_identifier(),
            DeviceId::new("7")
        );
    }
}
