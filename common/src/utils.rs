use std::time::Duration;

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 60 {
        let mins = secs / 60;
        let secs = secs % 60;
        format!("{}m {}s", mins, secs)
    } else if secs > 0 {
        format!("{}s", secs)
    } else {
        format!("{}ms", duration.as_millis())
    }
}

pub fn validate_url(url: &str) -> Result<(), String> {
    const SCHEMES: [&str; 4] = ["http://", "https://", "rtsp://", "rtsps://"];
    match SCHEMES.iter().find(|scheme| url.starts_with(*scheme)) {
        Some(scheme) if url.len() > scheme.len() => Ok(()),
        Some(_) => Err(format!("URL has no host: {}", url)),
        None => Err("URL must start with http://, https://, rtsp:// or rtsps://".to_string()),
    }
}

pub fn generate_unique_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_minutes_and_seconds() {
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(60)), "1m 0s");
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
    }

    #[test]
    fn url_validation() {
        assert!(validate_url("https://cameras.example/go2rtc-35").is_ok());
        assert!(validate_url("rtsp://10.0.0.4/stream1").is_ok());
        assert!(validate_url("https://").is_err());
        assert!(validate_url("/dev/video0").is_err());
    }
}
