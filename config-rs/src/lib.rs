//! config-rs/lib.rs
//! Shared configuration utilities for consistent service configuration
//! Provides standardized functions for port/address management and
//! typed environment-variable lookup

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

/// Get service port from environment variables with proper fallback
///
/// # Arguments
/// * `service_name` - The name of the service (e.g., "CHAT")
/// * `default_port` - The default port to use if not specified in environment
///
/// # Returns
/// The port number to use for the service
pub fn get_service_port(service_name: &str, default_port: u16) -> u16 {
    let var_name = format!("{}_SERVICE_PORT", service_name.to_uppercase());
    env::var(&var_name)
        .unwrap_or_else(|_| default_port.to_string())
        .parse::<u16>()
        .unwrap_or_else(|_| {
            log::warn!("Invalid port in {}, using default {}", var_name, default_port);
            default_port
        })
}

/// Create a SocketAddr for binding a service
///
/// # Arguments
/// * `service_name` - The name of the service (e.g., "CHAT")
/// * `default_port` - The default port to use if not specified in environment
///
/// # Returns
/// A SocketAddr configured with the appropriate bind address and port
pub fn get_bind_address(service_name: &str, default_port: u16) -> SocketAddr {
    let var_name = format!("{}_SERVICE_ADDR", service_name.to_uppercase());

    // Check if there's a full address override
    if let Ok(addr_str) = env::var(&var_name) {
        if let Ok(addr) = addr_str.parse::<SocketAddr>() {
            return addr;
        } else {
            // Check if it's in http://host:port format
            if addr_str.starts_with("http://") || addr_str.starts_with("https://") {
                let addr_parts = addr_str.split("://").collect::<Vec<&str>>();
                if addr_parts.len() > 1 {
                    if let Ok(addr) = addr_parts[1].parse::<SocketAddr>() {
                        return addr;
                    }
                }
            }
            log::warn!("Invalid address format in {}, using default", var_name);
        }
    }

    // Use the port from environment or default
    let port = get_service_port(service_name, default_port);
    format!("0.0.0.0:{}", port).parse().unwrap()
}

/// Read a typed value from an environment variable, falling back to a default
/// when the variable is unset or fails to parse
pub fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Get service name for logging and monitoring
///
/// # Arguments
/// * `service_name` - The name of the service (e.g., "CHAT")
///
/// # Returns
/// A formatted service name suitable for logging
pub fn get_formatted_service_name(service_name: &str) -> String {
    match service_name {
        "CHAT" => "chat-service".to_string(),
        _ => format!("{}-service", service_name.to_lowercase()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_service_port() {
        // Test with environment variable
        std::env::set_var("TEST_SERVICE_PORT", "9000");
        assert_eq!(get_service_port("TEST", 8000), 9000);

        // Test with default
        std::env::remove_var("UNKNOWN_SERVICE_PORT");
        assert_eq!(get_service_port("UNKNOWN", 8000), 8000);
    }

    #[test]
    fn test_env_or() {
        std::env::set_var("ENV_OR_TEST_TEMP", "0.4");
        assert_eq!(env_or("ENV_OR_TEST_TEMP", 0.7f32), 0.4f32);

        // Unset falls back to the default
        std::env::remove_var("ENV_OR_TEST_MISSING");
        assert_eq!(env_or("ENV_OR_TEST_MISSING", 42u32), 42);

        // Unparseable falls back to the default
        std::env::set_var("ENV_OR_TEST_BAD", "not-a-number");
        assert_eq!(env_or("ENV_OR_TEST_BAD", 3u8), 3);
    }

    #[test]
    fn test_get_formatted_service_name() {
        assert_eq!(get_formatted_service_name("CHAT"), "chat-service");
        assert_eq!(get_formatted_service_name("OTHER"), "other-service");
    }
}
