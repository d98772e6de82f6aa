use std::{
    collections::HashSet,
    net::{IpAddr, SocketAddr},
};

use eyre::Result;
use hyper::StatusCode;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::models::{AppConfig, CdnConfig, NodeConfig, SiteConfig};

static HOSTNAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9\-_]{0,61}[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9\-_]{0,61}[a-zA-Z0-9])?)*\.?$")
        .expect("valid regex")
});

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Site conflict detected: {message}")]
    SiteConflict { message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Application configuration validator
pub struct AppConfigValidator;

impl AppConfigValidator {
    /// Validate the entire configuration
    pub fn validate(config: &AppConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if config.listen.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "listen".to_string(),
            });
        }
        let mut addresses = HashSet::new();
        for listen in &config.listen {
            if let Err(e) = Self::validate_listen_address(&listen.address) {
                errors.push(e);
            } else if !addresses.insert(listen.address.as_str()) {
                errors.push(ValidationError::InvalidListenAddress {
                    address: listen.address.clone(),
                    reason: "Listed more than once".to_string(),
                });
            }
        }

        if config.sites.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "sites".to_string(),
            });
        }
        for site in &config.sites {
            if let Err(mut site_errors) = Self::validate_site(site) {
                errors.append(&mut site_errors);
            }
        }

        if let Err(conflict_error_list) = Self::check_site_conflicts(&config.sites) {
            errors.extend(conflict_error_list);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    fn validate_site(site: &SiteConfig) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        let name = &site.name;

        if name.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "site name".to_string(),
            });
        }

        if let Some(hosts) = &site.hosts {
            if hosts.is_empty() {
                errors.push(Self::empty_filter(name, "hosts"));
            }
            for host in hosts {
                if let Err(e) = Self::validate_host(host, &format!("site '{name}' hosts")) {
                    errors.push(e);
                }
            }
        }

        for (field, ports) in [("host_ports", &site.host_ports), ("ip_ports", &site.ip_ports)] {
            if let Some(ports) = ports {
                if ports.is_empty() {
                    errors.push(Self::empty_filter(name, field));
                }
                if ports.contains(&0) {
                    errors.push(ValidationError::InvalidField {
                        field: format!("site '{name}' {field}"),
                        message: "Port 0 never matches a request".to_string(),
                    });
                }
            }
        }

        if let Some(ips) = &site.ips {
            if ips.is_empty() {
                errors.push(Self::empty_filter(name, "ips"));
            }
            for ip in ips {
                if ip.parse::<IpAddr>().is_err() {
                    errors.push(ValidationError::InvalidField {
                        field: format!("site '{name}' ips"),
                        message: format!("'{ip}' is not an IP address"),
                    });
                }
            }
        }

        if let Some(cdn) = &site.cdn {
            if let Err(mut cdn_errors) = Self::validate_cdn(name, cdn) {
                errors.append(&mut cdn_errors);
            }
        }

        for node in &site.nodes {
            Self::validate_node(name, node, &mut errors);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_cdn(site: &str, cdn: &CdnConfig) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        for (field, host) in [("cdn.host", &cdn.host), ("cdn.origin_host", &cdn.origin_host)] {
            if let Err(e) = Self::validate_host(host, &format!("site '{site}' {field}")) {
                errors.push(e);
            }
        }
        if errors.is_empty() && cdn.host.eq_ignore_ascii_case(&cdn.origin_host) {
            errors.push(ValidationError::InvalidField {
                field: format!("site '{site}' cdn"),
                message: "CDN host and origin host must differ".to_string(),
            });
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_node(site: &str, node: &NodeConfig, errors: &mut Vec<ValidationError>) {
        if node.names.alternatives().is_empty() {
            errors.push(ValidationError::InvalidField {
                field: format!("site '{site}' node names"),
                message: "A node needs at least one spelling".to_string(),
            });
        }
        if let Some(redirect) = &node.redirect {
            if !Self::is_valid_redirect_status_code(redirect.status) {
                errors.push(ValidationError::InvalidField {
                    field: format!("site '{site}' node redirect status"),
                    message: format!("{} is not a redirect status", redirect.status),
                });
            }
            if redirect.location.is_empty() {
                errors.push(ValidationError::MissingField {
                    field: format!("site '{site}' node redirect location"),
                });
            }
        }
        for child in &node.children {
            Self::validate_node(site, child, errors);
        }
    }

    /// Sites with identical filters shadow each other: only the first one is ever reached.
    fn check_site_conflicts(sites: &[SiteConfig]) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        let mut names = HashSet::new();
        let mut filters = Vec::new();

        for site in sites {
            if !names.insert(site.name.as_str()) {
                errors.push(ValidationError::SiteConflict {
                    message: format!("Site name '{}' is used more than once", site.name),
                });
            }

            let key = Self::filter_key(site);
            if let Some((earlier, _)) = filters.iter().find(|(_, k)| *k == key) {
                errors.push(ValidationError::SiteConflict {
                    message: format!(
                        "Site '{}' has the same filters as '{}' and is never reached",
                        site.name, earlier
                    ),
                });
            }
            filters.push((site.name.clone(), key));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn filter_key(site: &SiteConfig) -> String {
        fn sorted<T: ToString>(list: &Option<Vec<T>>) -> String {
            match list {
                Some(list) => {
                    let mut items: Vec<String> = list
                        .iter()
                        .map(|item| item.to_string().to_ascii_lowercase())
                        .collect();
                    items.sort();
                    items.join(",")
                }
                None => "*".to_string(),
            }
        }
        format!(
            "{}|{}|{}|{}",
            sorted(&site.hosts),
            sorted(&site.host_ports),
            sorted(&site.ips),
            sorted(&site.ip_ports)
        )
    }

    fn empty_filter(site: &str, field: &str) -> ValidationError {
        ValidationError::InvalidField {
            field: format!("site '{site}' {field}"),
            message: "An empty list matches no request; omit the field to match all".to_string(),
        }
    }

    /// Check if status code is valid for redirects
    fn is_valid_redirect_status_code(code: u16) -> bool {
        StatusCode::from_u16(code).is_ok_and(|status| status.is_redirection())
    }

    /// Validate host field format
    fn validate_host(host: &str, field: &str) -> ValidationResult<()> {
        if host.is_empty() {
            return Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: "Host cannot be empty".to_string(),
            });
        }

        if host.contains("://") {
            return Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: "Host should not contain protocol (e.g., use 'example.com' not 'http://example.com')".to_string(),
            });
        }

        if host.parse::<IpAddr>().is_ok() {
            return Ok(());
        }

        // Internationalized names are accepted as written; only plain ASCII names are checked.
        if !host.is_ascii() {
            return Ok(());
        }

        if !HOSTNAME.is_match(host) {
            return Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: format!("Invalid hostname format: '{host}'"),
            });
        }

        Ok(())
    }

    /// Format multiple validation errors into a single message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.is_empty() {
            return "No errors".to_string();
        }

        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}
