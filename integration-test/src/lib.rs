//! Configuration helpers for the live-server integration tests.
//!
//! The tests in `tests/` run against a real directory server and skip
//! themselves when `LDAPBROWSE_TEST_SERVER` is not set. A throwaway
//! OpenLDAP container is enough:
//!
//! ```text
//! docker run --rm -p 3389:389 \
//!     -e LDAP_ORGANISATION=Example -e LDAP_DOMAIN=example.com \
//!     -e LDAP_ADMIN_PASSWORD=secret osixia/openldap
//!
//! LDAPBROWSE_TEST_SERVER=localhost \
//! LDAPBROWSE_TEST_PORT=3389 \
//! LDAPBROWSE_TEST_BASE=dc=example,dc=com \
//! LDAPBROWSE_TEST_BIND_DN=cn=admin,dc=example,dc=com \
//! LDAPBROWSE_TEST_PASSWORD=secret \
//!     cargo test -p integration-test
//! ```

use ldapbrowse::ConnectionSettings;

/// Connection settings from the environment, `None` when no test
/// server is configured.
pub fn test_settings() -> Option<ConnectionSettings> {
    let server = std::env::var("LDAPBROWSE_TEST_SERVER").ok()?;
    let mut settings = ConnectionSettings::new(server);
    if let Ok(port) = std::env::var("LDAPBROWSE_TEST_PORT") {
        settings.port = port
            .parse()
            .expect("LDAPBROWSE_TEST_PORT must be a port number");
    }
    settings.base_dn =
        std::env::var("LDAPBROWSE_TEST_BASE").unwrap_or_else(|_| "dc=example,dc=com".to_string());
    settings.username = std::env::var("LDAPBROWSE_TEST_BIND_DN").ok();
    settings.password = std::env::var("LDAPBROWSE_TEST_PASSWORD").ok();
    Some(settings)
}

/// Settings for a test, or `None` with a skip notice on stderr.
pub fn settings_or_skip(test: &str) -> Option<ConnectionSettings> {
    match test_settings() {
        Some(settings) => Some(settings),
        None => {
            eprintln!("{}: LDAPBROWSE_TEST_SERVER not set, skipping", test);
            None
        }
    }
}
