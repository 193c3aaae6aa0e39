//! Shared HTTP constants (routes, problem URIs).

pub(crate) const SETTINGS_ROUTE: &str = "/v1/settings";

pub(crate) const PROBLEM_INTERNAL: &str = "https://biblio.dev/problems/internal";
pub(crate) const PROBLEM_CONFIG_INVALID: &str = "https://biblio.dev/problems/config-invalid";
pub(crate) const PROBLEM_SERVICE_UNAVAILABLE: &str =
    "https://biblio.dev/problems/service-unavailable";
