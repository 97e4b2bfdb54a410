//! Broker destination names derived from domain names
//!
//! Domain names may contain characters that brokers treat specially in
//! destination names. Underscores are doubled first and dashes then become
//! single underscores, so distinct domains never share a queue.

/// Escape a domain name for use inside a broker destination
pub fn escape_domain(domain: &str) -> String {
    domain.replace('_', "__").replace('-', "_")
}

/// Queue consumed by the tunnel of `domain`
pub fn domain_queue_name(prefix: &str, domain: &str) -> String {
    format!("{}{}", prefix, escape_domain(domain))
}
