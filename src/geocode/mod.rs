use std::env;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;

const DEFAULT_BASE_URL: &str = "https://nominatim.openstreetmap.org";
const USER_AGENT: &str = "green-bud-guide/0.1 (club geocoding)";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Client for the third-party geocoding API used to backfill club
/// coordinates. Defaults to Nominatim; the base URL is overridable for
/// self-hosted instances and tests.
#[derive(Clone)]
pub struct GeocodeClient {
    http: Client,
    base_url: String,
    email: Option<String>,
}

impl GeocodeClient {
    pub fn from_env() -> Result<Self> {
        let base_url =
            env::var("GEOCODER_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let email = env::var("GEOCODER_EMAIL").ok();

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build geocoder HTTP client")?;

        Ok(Self {
            http,
            base_url,
            email,
        })
    }

    /// Resolve a free-form address to coordinates. Returns `None` when the
    /// geocoder finds no match; only transport/parse problems are errors.
    pub async fn geocode(&self, query: &str) -> Result<Option<Coordinates>> {
        let mut request = self
            .http
            .get(format!("{}/search", self.base_url))
            .query(&[
                ("q", query),
                ("format", "jsonv2"),
                ("limit", "1"),
                ("countrycodes", "de"),
            ]);

        if let Some(email) = &self.email {
            request = request.query(&[("email", email.as_str())]);
        }

        let places: Vec<NominatimPlace> = request
            .send()
            .await
            .context("geocoding request failed")?
            .error_for_status()
            .context("geocoder returned an error status")?
            .json()
            .await
            .context("failed to parse geocoder response")?;

        let Some(place) = places.into_iter().next() else {
            return Ok(None);
        };

        let latitude: f64 = place
            .lat
            .parse()
            .with_context(|| format!("geocoder returned invalid latitude: {}", place.lat))?;
        let longitude: f64 = place
            .lon
            .parse()
            .with_context(|| format!("geocoder returned invalid longitude: {}", place.lon))?;

        Ok(Some(Coordinates {
            latitude,
            longitude,
        }))
    }
}

/// Joins the club's address parts into one geocoder query, skipping blanks.
pub fn club_geocode_query(
    address: Option<&str>,
    postal_code: Option<&str>,
    city: Option<&str>,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(address) = address.map(str::trim).filter(|s| !s.is_empty()) {
        parts.push(address.to_string());
    }

    let locality = match (
        postal_code.map(str::trim).filter(|s| !s.is_empty()),
        city.map(str::trim).filter(|s| !s.is_empty()),
    ) {
        (Some(plz), Some(city)) => Some(format!("{plz} {city}")),
        (Some(plz), None) => Some(plz.to_string()),
        (None, Some(city)) => Some(city.to_string()),
        (None, None) => None,
    };
    if let Some(locality) = locality {
        parts.push(locality);
    }

    parts.push("Deutschland".to_string());
    parts.join(", ")
}

#[derive(Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_joins_all_parts() {
        let q = club_geocode_query(Some("Venloer Str. 40"), Some("50672"), Some("Köln"));
        assert_eq!(q, "Venloer Str. 40, 50672 Köln, Deutschland");
    }

    #[test]
    fn query_skips_blank_parts() {
        assert_eq!(club_geocode_query(None, None, Some("Berlin")), "Berlin, Deutschland");
        assert_eq!(club_geocode_query(Some("  "), Some("10115"), None), "10115, Deutschland");
        assert_eq!(club_geocode_query(None, None, None), "Deutschland");
    }

    #[test]
    fn place_payload_parses() {
        let raw = r#"[{"lat":"50.9375","lon":"6.9603","display_name":"Köln"}]"#;
        let places: Vec<NominatimPlace> = serde_json::from_str(raw).unwrap();
        assert_eq!(places[0].lat, "50.9375");
        assert_eq!(places[0].lon, "6.9603");
    }
}
