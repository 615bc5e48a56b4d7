//! Base URL resolution and API route construction.

use std::{fmt, str::FromStr};

use shared::domain::{PlantId, PredictionId};
use url::Url;

use crate::error::ClientError;

pub const LOCAL_API_URL: &str = "http://localhost:8000";
/// Host loopback as seen from inside the Android emulator.
pub const ANDROID_EMULATOR_API_URL: &str = "http://10.0.2.2:8000";
pub const IOS_SIMULATOR_API_URL: &str = "http://localhost:8000";
pub const PRODUCTION_API_URL: &str = "https://api.yourmedicinalplantapp.com";

const API_PREFIX: &str = "/api/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Deployment {
    #[default]
    Local,
    AndroidEmulator,
    IosSimulator,
    Production,
}

impl Deployment {
    pub fn base_url(self) -> &'static str {
        match self {
            Self::Local => LOCAL_API_URL,
            Self::AndroidEmulator => ANDROID_EMULATOR_API_URL,
            Self::IosSimulator => IOS_SIMULATOR_API_URL,
            Self::Production => PRODUCTION_API_URL,
        }
    }
}

impl FromStr for Deployment {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "local" | "dev" | "development" => Ok(Self::Local),
            "android" | "android-emulator" => Ok(Self::AndroidEmulator),
            "ios" | "ios-simulator" => Ok(Self::IosSimulator),
            "prod" | "production" => Ok(Self::Production),
            other => Err(format!(
                "unknown deployment '{other}' (expected local, android-emulator, ios-simulator or production)"
            )),
        }
    }
}

impl fmt::Display for Deployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Local => "local",
            Self::AndroidEmulator => "android-emulator",
            Self::IosSimulator => "ios-simulator",
            Self::Production => "production",
        })
    }
}

/// Validated service base URL, without a trailing slash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEndpoint {
    base: String,
}

impl ApiEndpoint {
    pub fn parse(raw: &str) -> Result<Self, ClientError> {
        let raw = raw.trim();
        let invalid = |reason: String| ClientError::InvalidEndpoint {
            url: raw.to_string(),
            reason,
        };

        let url = Url::parse(raw).map_err(|err| invalid(err.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(invalid("base url must not carry a query or fragment".into()));
        }

        Ok(Self {
            base: url.as_str().trim_end_matches('/').to_string(),
        })
    }

    pub fn for_deployment(deployment: Deployment) -> Result<Self, ClientError> {
        Self::parse(deployment.base_url())
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    fn route(&self, path: &str) -> String {
        format!("{}{API_PREFIX}{path}", self.base)
    }

    pub fn predict(&self) -> String {
        self.route("/predict/")
    }

    pub fn predict_batch(&self) -> String {
        self.route("/predict/batch")
    }

    pub fn history(&self) -> String {
        self.route("/predict/history")
    }

    pub fn feedback(&self, prediction_id: PredictionId) -> String {
        self.route(&format!("/predict/{prediction_id}/feedback"))
    }

    pub fn explain_combined(&self) -> String {
        self.route("/explain/combined")
    }

    pub fn plants(&self) -> String {
        self.route("/plants")
    }

    pub fn plant(&self, plant_id: PlantId) -> String {
        self.route(&format!("/plants/{plant_id}"))
    }

    pub fn medicinal_properties(&self, plant_id: PlantId) -> String {
        self.route(&format!("/plants/{plant_id}/medicinal"))
    }

    pub fn search_by_name(&self) -> String {
        self.route("/plants/search/by-name")
    }

    pub fn similar_plants(&self, plant_id: PlantId) -> String {
        self.route(&format!("/recommend/similar/{plant_id}"))
    }

    pub fn plants_for_ailment(&self) -> String {
        self.route("/recommend/ailment")
    }

    pub fn location_recommendations(&self) -> String {
        self.route("/recommend/location")
    }
}

impl Default for ApiEndpoint {
    fn default() -> Self {
        Self {
            base: LOCAL_API_URL.to_string(),
        }
    }
}

impl fmt::Display for ApiEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_routes_from_base_with_trailing_slash() {
        let endpoint = ApiEndpoint::parse("http://127.0.0.1:9000/").expect("endpoint");
        assert_eq!(endpoint.predict(), "http://127.0.0.1:9000/api/v1/predict/");
        assert_eq!(
            endpoint.explain_combined(),
            "http://127.0.0.1:9000/api/v1/explain/combined"
        );
        assert_eq!(
            endpoint.plant(PlantId(7)),
            "http://127.0.0.1:9000/api/v1/plants/7"
        );
        assert_eq!(
            endpoint.feedback(PredictionId(12)),
            "http://127.0.0.1:9000/api/v1/predict/12/feedback"
        );
        assert_eq!(
            endpoint.similar_plants(PlantId(7)),
            "http://127.0.0.1:9000/api/v1/recommend/similar/7"
        );
    }

    #[test]
    fn keeps_gateway_path_prefix() {
        let endpoint = ApiEndpoint::parse("https://example.org/gateway").expect("endpoint");
        assert_eq!(
            endpoint.search_by_name(),
            "https://example.org/gateway/api/v1/plants/search/by-name"
        );
    }

    #[test]
    fn rejects_non_http_urls() {
        assert!(matches!(
            ApiEndpoint::parse("ftp://example.org"),
            Err(ClientError::InvalidEndpoint { .. })
        ));
        assert!(ApiEndpoint::parse("localhost:8000/api").is_err());
        assert!(ApiEndpoint::parse("http://example.org/?debug=1").is_err());
    }

    #[test]
    fn deployment_presets_resolve_to_expected_hosts() {
        assert_eq!(Deployment::default(), Deployment::Local);
        assert_eq!(
            ApiEndpoint::for_deployment(Deployment::AndroidEmulator)
                .expect("android")
                .base(),
            "http://10.0.2.2:8000"
        );
        assert_eq!(
            "ios_simulator".parse::<Deployment>(),
            Ok(Deployment::IosSimulator)
        );
        assert_eq!("PROD".parse::<Deployment>(), Ok(Deployment::Production));
        assert!("staging".parse::<Deployment>().is_err());
    }
}
