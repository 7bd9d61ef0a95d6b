/// Platform-aware timestamps for directory and relay records.
///
/// On native platforms, this uses `chrono::Utc::now()`.
/// On WASM, this uses `js_sys::Date` since `std::time::SystemTime`
/// is not available on `wasm32-unknown-unknown`.

/// Current time as an RFC 3339 UTC string with millisecond precision,
/// e.g. `2024-01-15T12:00:00.000Z`.
///
/// The fixed width makes lexicographic order equal to chronological order.
pub fn now_rfc3339() -> String {
    #[cfg(target_arch = "wasm32")]
    {
        String::from(js_sys::Date::new_0().to_iso_string())
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    }
}
