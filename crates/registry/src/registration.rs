//! Decoding of provider registration strings such as
//! `dubbo%3A%2F%2F10.0.0.1%3A20880%2Fcom.acme.UserService%3Fversion%3D1.0.0`.

use dubbo_invoke_types::ProviderEndpoint;
use percent_encoding::percent_decode_str;
use url::Url;

/// Percent-decodes `raw` and keeps the scheme, host and port of
/// `scheme://host:port/service?query`.
pub fn parse_registration(raw: &str) -> Result<ProviderEndpoint, String> {
    let decoded = percent_decode_str(raw.trim()).decode_utf8_lossy();
    if !decoded.contains("://") {
        return Err(format!("'{decoded}' is not a provider URL"));
    }
    let url = Url::parse(&decoded).map_err(|error| format!("'{decoded}': {error}"))?;
    let host = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| format!("'{decoded}' has no host"))?;
    let port = url.port().ok_or_else(|| format!("'{decoded}' has no port"))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    Ok(ProviderEndpoint::new(host, port, url.scheme()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_percent_encoded_registration() {
        let raw = "dubbo%3A%2F%2F10.0.0.7%3A20880%2Fcom.acme.UserService%3Fanyhost%3Dtrue%26version%3D1.0.0";
        let endpoint = parse_registration(raw).expect("decodable");
        assert_eq!(endpoint, ProviderEndpoint::new("10.0.0.7", 20880, "dubbo"));
    }

    #[test]
    fn accepts_plain_registration_with_other_protocol() {
        let endpoint = parse_registration("tri://provider.local:50051/com.acme.A").expect("decodable");
        assert_eq!(endpoint.protocol_tag, "tri");
        assert_eq!(endpoint.authority(), "provider.local:50051");
    }

    #[test]
    fn rejects_entries_without_port_or_scheme() {
        assert!(parse_registration("dubbo%3A%2F%2F10.0.0.7%2Fcom.acme.A").is_err());
        assert!(parse_registration("10.0.0.7:20880").is_err());
    }
}
