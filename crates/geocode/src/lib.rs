//! Geocoding API client: free-text addresses to ranked coordinate
//! candidates.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use sliceline_core::domain::location::Coordinates;
use sliceline_core::errors::PortError;
use sliceline_core::ports::Geocoder;

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("geocoder transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("geocoder returned status {0}")]
    Status(u16),
    #[error("geocoder response could not be decoded: {0}")]
    Decode(String),
}

impl From<GeocodeError> for PortError {
    fn from(error: GeocodeError) -> Self {
        PortError::transient("geocoder", error.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct GeocoderResponse {
    response: ResponseBody,
}

#[derive(Debug, Deserialize)]
struct ResponseBody {
    #[serde(rename = "GeoObjectCollection")]
    collection: GeoObjectCollection,
}

#[derive(Debug, Deserialize)]
struct GeoObjectCollection {
    #[serde(rename = "featureMember", default)]
    members: Vec<FeatureMember>,
}

#[derive(Debug, Deserialize)]
struct FeatureMember {
    #[serde(rename = "GeoObject")]
    geo_object: GeoObject,
}

#[derive(Debug, Deserialize)]
struct GeoObject {
    #[serde(rename = "Point")]
    point: Point,
}

#[derive(Debug, Deserialize)]
struct Point {
    /// Space-separated "longitude latitude".
    pos: String,
}

/// Candidates in the order the service ranked them, most relevant first.
/// An empty list means the address was not recognized.
fn parse_candidates(raw: Value) -> Result<Vec<Coordinates>, GeocodeError> {
    let response: GeocoderResponse =
        serde_json::from_value(raw).map_err(|err| GeocodeError::Decode(err.to_string()))?;

    response
        .response
        .collection
        .members
        .into_iter()
        .map(|member| parse_pos(&member.geo_object.point.pos))
        .collect()
}

fn parse_pos(pos: &str) -> Result<Coordinates, GeocodeError> {
    let mut parts = pos.split_whitespace();
    let longitude = parts.next().and_then(|raw| raw.parse::<f64>().ok());
    let latitude = parts.next().and_then(|raw| raw.parse::<f64>().ok());
    match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => Ok(Coordinates { latitude, longitude }),
        _ => Err(GeocodeError::Decode(format!("malformed point position `{pos}`"))),
    }
}

pub struct GeocodeClient {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    request_timeout: Duration,
}

impl GeocodeClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: SecretString,
        request_timeout: Duration,
    ) -> Self {
        Self { http, base_url: base_url.into(), api_key, request_timeout }
    }
}

#[async_trait]
impl Geocoder for GeocodeClient {
    async fn resolve(&self, address: &str) -> Result<Vec<Coordinates>, PortError> {
        let response = self
            .http
            .get(&self.base_url)
            .timeout(self.request_timeout)
            .query(&[
                ("geocode", address),
                ("apikey", self.api_key.expose_secret()),
                ("format", "json"),
            ])
            .send()
            .await
            .map_err(GeocodeError::from)?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeocodeError::Status(status.as_u16()).into());
        }
        let raw: Value = response.json().await.map_err(GeocodeError::from)?;

        let candidates = parse_candidates(raw)?;
        debug!(
            event_name = "geocode.resolved",
            candidate_count = candidates.len(),
            "address resolved"
        );
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{parse_candidates, parse_pos};

    #[test]
    fn candidates_keep_the_service_ranking_and_swap_pos_order() {
        let raw = json!({
            "response": {"GeoObjectCollection": {"featureMember": [
                {"GeoObject": {"Point": {"pos": "37.617635 55.755814"}}},
                {"GeoObject": {"Point": {"pos": "37.413673 55.971591"}}}
            ]}}
        });

        let candidates = parse_candidates(raw).expect("parse");
        assert_eq!(candidates.len(), 2);
        // `pos` is "lon lat"; Coordinates carries latitude first.
        assert!((candidates[0].latitude - 55.755814).abs() < 1e-9);
        assert!((candidates[0].longitude - 37.617635).abs() < 1e-9);
    }

    #[test]
    fn unrecognized_address_parses_to_an_empty_list() {
        let raw = json!({
            "response": {"GeoObjectCollection": {"featureMember": []}}
        });
        assert!(parse_candidates(raw).expect("parse").is_empty());
    }

    #[test]
    fn malformed_position_is_a_decode_error() {
        assert!(parse_pos("not-a-point").is_err());
        assert!(parse_pos("37.61").is_err());
        assert!(parse_pos("").is_err());
    }
}
