use std::{
    collections::{BTreeSet, HashMap},
    sync::LazyLock,
};

/// Static record for one German city the club search knows about.
///
/// `aliases` carries the spellings users actually type (umlaut-free
/// transliterations, English exonyms, long-form official names). `neighbors`
/// reference other entries by canonical key; unknown keys are ignored at
/// lookup time. Coordinates are the city centroid used for distance display.
pub struct CityRecord {
    pub key: &'static str,
    pub aliases: &'static [&'static str],
    pub neighbors: &'static [&'static str],
    pub radius_km: f64,
    pub postal_codes: &'static [&'static str],
    pub lat: f64,
    pub lon: f64,
}

const CITIES: &[CityRecord] = &[
    CityRecord {
        key: "berlin",
        aliases: &["berlin"],
        neighbors: &["potsdam"],
        radius_km: 35.0,
        postal_codes: &[
            "10115", "10117", "10178", "10243", "10437", "10559", "12043", "13353",
        ],
        lat: 52.5200,
        lon: 13.4050,
    },
    CityRecord {
        key: "hamburg",
        aliases: &["hamburg"],
        neighbors: &[],
        radius_km: 30.0,
        postal_codes: &["20095", "20144", "20359", "22041", "22765"],
        lat: 53.5511,
        lon: 9.9937,
    },
    CityRecord {
        key: "münchen",
        aliases: &["münchen", "muenchen", "munich"],
        neighbors: &[],
        radius_km: 25.0,
        postal_codes: &["80331", "80539", "80803", "81541", "81667"],
        lat: 48.1351,
        lon: 11.5820,
    },
    CityRecord {
        key: "köln",
        aliases: &["köln", "koeln", "cologne"],
        neighbors: &["bonn", "leverkusen", "düsseldorf"],
        radius_km: 25.0,
        postal_codes: &["50667", "50668", "50672", "50823", "50937", "51063"],
        lat: 50.9375,
        lon: 6.9603,
    },
    CityRecord {
        key: "frankfurt",
        aliases: &["frankfurt", "frankfurt am main", "ffm"],
        neighbors: &["offenbach", "darmstadt", "wiesbaden", "mainz"],
        radius_km: 25.0,
        postal_codes: &["60311", "60313", "60486", "60594"],
        lat: 50.1109,
        lon: 8.6821,
    },
    CityRecord {
        key: "stuttgart",
        aliases: &["stuttgart"],
        neighbors: &["esslingen", "ludwigsburg"],
        radius_km: 20.0,
        postal_codes: &["70173", "70178", "70565"],
        lat: 48.7758,
        lon: 9.1829,
    },
    CityRecord {
        key: "düsseldorf",
        aliases: &["düsseldorf", "duesseldorf"],
        neighbors: &["köln", "leverkusen", "essen", "duisburg"],
        radius_km: 20.0,
        postal_codes: &["40210", "40213", "40477", "40545"],
        lat: 51.2277,
        lon: 6.7735,
    },
    CityRecord {
        key: "dortmund",
        aliases: &["dortmund"],
        neighbors: &["bochum", "essen"],
        radius_km: 20.0,
        postal_codes: &["44135", "44137", "44263"],
        lat: 51.5136,
        lon: 7.4653,
    },
    CityRecord {
        key: "essen",
        aliases: &["essen"],
        neighbors: &["duisburg", "bochum", "düsseldorf"],
        radius_km: 15.0,
        postal_codes: &["45127", "45128", "45307"],
        lat: 51.4556,
        lon: 7.0116,
    },
    CityRecord {
        key: "leipzig",
        aliases: &["leipzig"],
        neighbors: &["halle"],
        radius_km: 20.0,
        postal_codes: &["04103", "04109", "04229"],
        lat: 51.3397,
        lon: 12.3731,
    },
    CityRecord {
        key: "bremen",
        aliases: &["bremen"],
        neighbors: &[],
        radius_km: 20.0,
        postal_codes: &["28195", "28203", "28717"],
        lat: 53.0793,
        lon: 8.8017,
    },
    CityRecord {
        key: "dresden",
        aliases: &["dresden"],
        neighbors: &[],
        radius_km: 20.0,
        postal_codes: &["01067", "01069", "01307"],
        lat: 51.0504,
        lon: 13.7373,
    },
    CityRecord {
        key: "hannover",
        aliases: &["hannover", "hanover"],
        neighbors: &[],
        radius_km: 20.0,
        postal_codes: &["30159", "30161", "30449"],
        lat: 52.3759,
        lon: 9.7320,
    },
    CityRecord {
        key: "nürnberg",
        aliases: &["nürnberg", "nuernberg", "nuremberg"],
        neighbors: &["fürth", "erlangen"],
        radius_km: 20.0,
        postal_codes: &["90402", "90403", "90461"],
        lat: 49.4521,
        lon: 11.0767,
    },
    CityRecord {
        key: "duisburg",
        aliases: &["duisburg"],
        neighbors: &["essen", "düsseldorf"],
        radius_km: 15.0,
        postal_codes: &["47051", "47053", "47166"],
        lat: 51.4344,
        lon: 6.7623,
    },
    CityRecord {
        key: "bochum",
        aliases: &["bochum"],
        neighbors: &["dortmund", "essen"],
        radius_km: 15.0,
        postal_codes: &["44787", "44789", "44866"],
        lat: 51.4818,
        lon: 7.2162,
    },
    CityRecord {
        key: "bonn",
        aliases: &["bonn"],
        neighbors: &["köln"],
        radius_km: 15.0,
        postal_codes: &["53111", "53113", "53225"],
        lat: 50.7374,
        lon: 7.0982,
    },
    CityRecord {
        key: "potsdam",
        aliases: &["potsdam"],
        neighbors: &["berlin"],
        radius_km: 15.0,
        postal_codes: &["14467", "14469", "14482"],
        lat: 52.3906,
        lon: 13.0645,
    },
    CityRecord {
        key: "leverkusen",
        aliases: &["leverkusen"],
        neighbors: &["köln", "düsseldorf"],
        radius_km: 12.0,
        postal_codes: &["51373", "51375", "51379"],
        lat: 51.0459,
        lon: 6.9853,
    },
    CityRecord {
        key: "offenbach",
        aliases: &["offenbach", "offenbach am main"],
        neighbors: &["frankfurt"],
        radius_km: 10.0,
        postal_codes: &["63065", "63067", "63069"],
        lat: 50.0956,
        lon: 8.7761,
    },
    CityRecord {
        key: "wiesbaden",
        aliases: &["wiesbaden"],
        neighbors: &["frankfurt", "mainz"],
        radius_km: 15.0,
        postal_codes: &["65183", "65185", "65189"],
        lat: 50.0826,
        lon: 8.2400,
    },
    CityRecord {
        key: "mainz",
        aliases: &["mainz"],
        neighbors: &["wiesbaden", "frankfurt"],
        radius_km: 12.0,
        postal_codes: &["55116", "55118", "55131"],
        lat: 49.9929,
        lon: 8.2473,
    },
    CityRecord {
        key: "darmstadt",
        aliases: &["darmstadt"],
        neighbors: &["frankfurt"],
        radius_km: 12.0,
        postal_codes: &["64283", "64285", "64289"],
        lat: 49.8728,
        lon: 8.6512,
    },
    CityRecord {
        key: "halle",
        aliases: &["halle", "halle (saale)", "halle saale"],
        neighbors: &["leipzig"],
        radius_km: 15.0,
        postal_codes: &["06108", "06110", "06114"],
        lat: 51.4969,
        lon: 11.9695,
    },
    CityRecord {
        key: "fürth",
        aliases: &["fürth", "fuerth"],
        neighbors: &["nürnberg", "erlangen"],
        radius_km: 10.0,
        postal_codes: &["90762", "90763"],
        lat: 49.4771,
        lon: 10.9887,
    },
    CityRecord {
        key: "erlangen",
        aliases: &["erlangen"],
        neighbors: &["nürnberg", "fürth"],
        radius_km: 10.0,
        postal_codes: &["91052", "91054"],
        lat: 49.5897,
        lon: 11.0120,
    },
    CityRecord {
        key: "esslingen",
        aliases: &["esslingen", "esslingen am neckar"],
        neighbors: &["stuttgart"],
        radius_km: 10.0,
        postal_codes: &["73728", "73730"],
        lat: 48.7406,
        lon: 9.3108,
    },
    CityRecord {
        key: "ludwigsburg",
        aliases: &["ludwigsburg"],
        neighbors: &["stuttgart"],
        radius_km: 10.0,
        postal_codes: &["71634", "71636", "71638"],
        lat: 48.8976,
        lon: 9.1916,
    },
];

struct LookupIndex {
    by_key: HashMap<&'static str, &'static CityRecord>,
    alias_to_city: HashMap<&'static str, &'static str>,
    postal_to_city: HashMap<&'static str, &'static str>,
    // Prefix buckets keep table order so ambiguous prefixes resolve
    // deterministically to the first listed city.
    prefix3_to_cities: HashMap<String, Vec<&'static str>>,
    prefix2_to_cities: HashMap<String, Vec<&'static str>>,
}

static INDEX: LazyLock<LookupIndex> = LazyLock::new(|| {
    let mut by_key = HashMap::new();
    let mut alias_to_city = HashMap::new();
    let mut postal_to_city = HashMap::new();
    let mut prefix3_to_cities: HashMap<String, Vec<&'static str>> = HashMap::new();
    let mut prefix2_to_cities: HashMap<String, Vec<&'static str>> = HashMap::new();

    for city in CITIES {
        by_key.insert(city.key, city);
        for alias in city.aliases {
            alias_to_city.insert(*alias, city.key);
        }
        for code in city.postal_codes {
            postal_to_city.insert(*code, city.key);
            let bucket3 = prefix3_to_cities.entry(code[..3].to_string()).or_default();
            if !bucket3.contains(&city.key) {
                bucket3.push(city.key);
            }
            let bucket2 = prefix2_to_cities.entry(code[..2].to_string()).or_default();
            if !bucket2.contains(&city.key) {
                bucket2.push(city.key);
            }
        }
    }

    LookupIndex {
        by_key,
        alias_to_city,
        postal_to_city,
        prefix3_to_cities,
        prefix2_to_cities,
    }
});

pub fn city(key: &str) -> Option<&'static CityRecord> {
    INDEX.by_key.get(key).copied()
}

/// Resolves free-text input (city name, alias or postal code) to a canonical
/// city key.
///
/// Resolution order: exact alias hit, then for all-digit input exact postal
/// code followed by 3- and 2-digit prefix buckets, then ranked substring
/// containment against every alias. Substring candidates prefer the longest
/// matching alias so "frankfurt am main-bockenheim" lands on frankfurt rather
/// than a shorter incidental hit.
pub fn find_main_city(query: &str) -> Option<&'static str> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }

    if let Some(key) = INDEX.alias_to_city.get(needle.as_str()) {
        return Some(*key);
    }

    if needle.chars().all(|c| c.is_ascii_digit()) {
        if let Some(key) = INDEX.postal_to_city.get(needle.as_str()) {
            return Some(*key);
        }
        if needle.len() >= 3 {
            if let Some(bucket) = INDEX.prefix3_to_cities.get(&needle[..3]) {
                return bucket.first().copied();
            }
        }
        if needle.len() >= 2 {
            if let Some(bucket) = INDEX.prefix2_to_cities.get(&needle[..2]) {
                return bucket.first().copied();
            }
        }
        return None;
    }

    let mut best: Option<(&'static str, usize)> = None;
    for city in CITIES {
        for alias in city.aliases {
            if alias.contains(&needle) || needle.contains(alias) {
                let score = alias.len();
                if best.map_or(true, |(_, len)| score > len) {
                    best = Some((city.key, score));
                }
            }
        }
    }
    best.map(|(key, _)| key)
}

/// Unions the raw query with the resolved city's aliases and all neighbor
/// aliases, widening the match surface for the club query builder.
pub fn expanded_search_terms(query: &str) -> BTreeSet<String> {
    let mut terms = BTreeSet::new();
    let trimmed = query.trim().to_lowercase();
    if trimmed.is_empty() {
        return terms;
    }
    terms.insert(trimmed.clone());

    let Some(key) = find_main_city(&trimmed) else {
        return terms;
    };
    let Some(main) = city(key) else {
        return terms;
    };

    for alias in main.aliases {
        terms.insert((*alias).to_string());
    }
    for neighbor_key in main.neighbors {
        if let Some(neighbor) = city(neighbor_key) {
            for alias in neighbor.aliases {
                terms.insert((*alias).to_string());
            }
        }
    }

    terms
}

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two WGS84 coordinates in kilometers.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_postal_code_resolves() {
        assert_eq!(find_main_city("50667"), Some("köln"));
    }

    #[test]
    fn alias_resolves_to_canonical_key() {
        assert_eq!(find_main_city("koeln"), Some("köln"));
        assert_eq!(find_main_city("Munich"), Some("münchen"));
        assert_eq!(find_main_city("  BERLIN "), Some("berlin"));
    }

    #[test]
    fn unknown_input_returns_none() {
        assert_eq!(find_main_city("xyz-unknown"), None);
        assert_eq!(find_main_city(""), None);
        assert_eq!(find_main_city("   "), None);
    }

    #[test]
    fn postal_prefix_falls_back_in_order() {
        // 506xx is only used by köln in the table.
        assert_eq!(find_main_city("50699"), Some("köln"));
        // Two digits still narrow down to the first city carrying 50xxx codes.
        assert_eq!(find_main_city("5012"), Some("köln"));
    }

    #[test]
    fn digits_without_prefix_bucket_return_none() {
        assert_eq!(find_main_city("99999"), None);
    }

    #[test]
    fn substring_match_prefers_longest_alias() {
        assert_eq!(
            find_main_city("frankfurt am main-bockenheim"),
            Some("frankfurt")
        );
        assert_eq!(find_main_city("esslingen am neckar zentrum"), Some("esslingen"));
    }

    #[test]
    fn expanded_terms_include_neighbors() {
        let terms = expanded_search_terms("koeln");
        assert!(terms.contains("köln"));
        assert!(terms.contains("cologne"));
        assert!(terms.contains("bonn"));
        assert!(terms.contains("leverkusen"));
        assert!(terms.contains("düsseldorf"));
    }

    #[test]
    fn expanded_terms_for_unknown_query_only_echo_input() {
        let terms = expanded_search_terms("atlantis");
        assert_eq!(terms.len(), 1);
        assert!(terms.contains("atlantis"));
    }

    #[test]
    fn haversine_matches_known_distance() {
        let cologne = city("köln").unwrap();
        let berlin = city("berlin").unwrap();
        let km = haversine_km(cologne.lat, cologne.lon, berlin.lat, berlin.lon);
        assert!((km - 477.0).abs() < 10.0, "got {km}");
    }

    #[test]
    fn every_neighbor_key_is_known() {
        for record in CITIES {
            for neighbor in record.neighbors {
                assert!(city(neighbor).is_some(), "unknown neighbor {neighbor}");
            }
        }
    }

    #[test]
    fn postal_codes_are_unique_across_cities() {
        let mut seen = std::collections::HashSet::new();
        for record in CITIES {
            for code in record.postal_codes {
                assert!(seen.insert(*code), "duplicate postal code {code}");
            }
        }
    }
}
