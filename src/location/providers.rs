//! Location providers: the DPA API client and the built-in fallback dataset.

use super::types::{Commune, LocationError, Region};
use serde::Deserialize;
use serde_json::Value;
use std::io;
use std::time::Duration;

pub const DPA_BASE_URL: &str = "https://apis.digital.gob.cl/dpa";
const USER_AGENT: &str = "PortalGeo/0.3 (rental-portal)";

pub type RemoteResult<T> = Result<Vec<T>, LocationError>;

/// An authoritative, possibly unavailable, source of divisions.
pub trait RemoteSource: Send + Sync {
    fn fetch_regions(&self) -> RemoteResult<Region>;
    fn fetch_communes(&self, region_code: &str) -> RemoteResult<Commune>;
    fn fetch_all_communes(&self) -> RemoteResult<Commune>;
}

// ─── Built-in dataset ───────────────────────────────────────────

struct BuiltinRegion {
    code: &'static str,
    name: &'static str,
    communes: &'static [(&'static str, &'static str)],
}

/// All regions of Chile with a hand-picked subset of their communes.
const BUILTIN_REGIONS: &[BuiltinRegion] = &[
    BuiltinRegion {
        code: "15", name: "Arica y Parinacota",
        communes: &[("15101", "Arica"), ("15102", "Camarones"), ("15201", "Putre")],
    },
    BuiltinRegion {
        code: "01", name: "Tarapacá",
        communes: &[("01101", "Iquique"), ("01107", "Alto Hospicio"), ("01401", "Pozo Almonte")],
    },
    BuiltinRegion {
        code: "02", name: "Antofagasta",
        communes: &[("02101", "Antofagasta"), ("02201", "Calama"), ("02301", "Tocopilla")],
    },
    BuiltinRegion {
        code: "03", name: "Atacama",
        communes: &[("03101", "Copiapó"), ("03201", "Chañaral"), ("03301", "Vallenar")],
    },
    BuiltinRegion {
        code: "04", name: "Coquimbo",
        communes: &[("04101", "La Serena"), ("04102", "Coquimbo"), ("04301", "Ovalle")],
    },
    BuiltinRegion {
        code: "05", name: "Valparaíso",
        communes: &[
            ("05101", "Valparaíso"), ("05109", "Viña del Mar"), ("05301", "Los Andes"),
            ("05501", "Quillota"), ("05601", "San Antonio"),
        ],
    },
    BuiltinRegion {
        code: "13", name: "Metropolitana de Santiago",
        communes: &[
            ("13101", "Santiago"), ("13110", "La Florida"), ("13114", "Las Condes"),
            ("13119", "Maipú"), ("13123", "Providencia"), ("13201", "Puente Alto"),
        ],
    },
    BuiltinRegion {
        code: "06", name: "Libertador General Bernardo O'Higgins",
        communes: &[("06101", "Rancagua"), ("06201", "Pichilemu"), ("06301", "San Fernando")],
    },
    BuiltinRegion {
        code: "07", name: "Maule",
        communes: &[("07101", "Talca"), ("07301", "Curicó"), ("07401", "Linares")],
    },
    BuiltinRegion {
        code: "16", name: "Ñuble",
        communes: &[("16101", "Chillán"), ("16103", "Chillán Viejo"), ("16301", "San Carlos")],
    },
    BuiltinRegion {
        code: "08", name: "Biobío",
        communes: &[("08101", "Concepción"), ("08110", "Talcahuano"), ("08301", "Los Ángeles")],
    },
    BuiltinRegion {
        code: "09", name: "La Araucanía",
        communes: &[("09101", "Temuco"), ("09112", "Padre Las Casas"), ("09201", "Angol")],
    },
    BuiltinRegion {
        code: "14", name: "Los Ríos",
        communes: &[("14101", "Valdivia"), ("14201", "La Unión")],
    },
    BuiltinRegion {
        code: "10", name: "Los Lagos",
        communes: &[("10101", "Puerto Montt"), ("10201", "Castro"), ("10301", "Osorno")],
    },
    BuiltinRegion {
        code: "11", name: "Aysén del General Carlos Ibáñez del Campo",
        communes: &[("11101", "Coyhaique"), ("11201", "Aysén")],
    },
    BuiltinRegion {
        code: "12", name: "Magallanes y de la Antártica Chilena",
        communes: &[("12101", "Punta Arenas"), ("12401", "Natales")],
    },
];

/// Region codes are compared numerically when both sides are numeric,
/// so "5" and "05" name the same region.
fn same_region_code(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    match (a.parse::<u32>(), b.parse::<u32>()) {
        (Ok(x), Ok(y)) => x == y,
        _ => a.eq_ignore_ascii_case(b),
    }
}

fn builtin_region(code: &str) -> Option<&'static BuiltinRegion> {
    BUILTIN_REGIONS.iter().find(|r| same_region_code(r.code, code))
}

/// The full built-in region list (north to south).
pub fn builtin_regions() -> Vec<Region> {
    BUILTIN_REGIONS.iter().map(|r| Region::new(r.code, r.name)).collect()
}

/// Built-in communes for a region, or None when the code is unknown.
pub fn builtin_communes(region_code: &str) -> Option<Vec<Commune>> {
    builtin_region(region_code).map(|r| {
        r.communes.iter().map(|(code, name)| Commune::new(*code, *name)).collect()
    })
}

/// Every built-in commune, grouped by region in table order.
pub fn builtin_all_communes() -> Vec<Commune> {
    BUILTIN_REGIONS
        .iter()
        .flat_map(|r| r.communes.iter().map(|(code, name)| Commune::new(*code, *name)))
        .collect()
}

// ─── DPA API provider ───────────────────────────────────────────

/// Wire shape of one DPA entry. `codigo` arrives as a string or a number.
#[derive(Deserialize, Debug)]
struct DpaEntry {
    #[serde(default)]
    codigo: Value,
    #[serde(default)]
    nombre: Option<String>,
}

/// Decode a DPA list body into `(code, name)` pairs. One malformed entry
/// rejects the whole payload.
pub(crate) fn decode_entries(body: &str) -> Result<Vec<(String, String)>, LocationError> {
    let raw: Vec<DpaEntry> = serde_json::from_str(body)
        .map_err(|e| LocationError::InvalidResponse(e.to_string()))?;

    if raw.is_empty() {
        return Err(LocationError::Empty);
    }

    raw.into_iter()
        .enumerate()
        .map(|(i, entry)| {
            let code = match entry.codigo {
                Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
                Value::Number(n) => n.to_string(),
                other => {
                    return Err(LocationError::InvalidResponse(format!(
                        "entry {}: bad codigo {}",
                        i, other
                    )))
                }
            };
            let name = entry
                .nombre
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .ok_or_else(|| {
                    LocationError::InvalidResponse(format!("entry {}: missing nombre", i))
                })?;
            Ok((code, name))
        })
        .collect()
}

/// Blocking client for the Chilean DPA API.
pub struct DpaClient {
    agent: ureq::Agent,
    base_url: String,
    timeout: Duration,
    all_communes_timeout: Duration,
}

impl DpaClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration, all_communes_timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().user_agent(USER_AGENT).build();
        Self {
            agent,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            all_communes_timeout,
        }
    }

    fn get_entries(&self, path: &str, timeout: Duration) -> Result<Vec<(String, String)>, LocationError> {
        let url = format!("{}{}", self.base_url, path);
        log::debug!("GET {}", url);

        let response = self
            .agent
            .get(&url)
            .timeout(timeout)
            .call()
            .map_err(|e| match e {
                ureq::Error::Status(code, _) => LocationError::Status(code),
                ureq::Error::Transport(t) => transport_error(t),
            })?;

        let body = response.into_string().map_err(|e| io_error(&e))?;
        decode_entries(&body)
    }
}

impl RemoteSource for DpaClient {
    fn fetch_regions(&self) -> RemoteResult<Region> {
        let entries = self.get_entries("/regiones", self.timeout)?;
        Ok(entries.into_iter().map(|(code, name)| Region { code, name }).collect())
    }

    fn fetch_communes(&self, region_code: &str) -> RemoteResult<Commune> {
        let path = format!("/regiones/{}/comunas", urlencod(region_code));
        let entries = self.get_entries(&path, self.timeout)?;
        Ok(entries.into_iter().map(|(code, name)| Commune { code, name }).collect())
    }

    fn fetch_all_communes(&self) -> RemoteResult<Commune> {
        let entries = self.get_entries("/comunas", self.all_communes_timeout)?;
        Ok(entries.into_iter().map(|(code, name)| Commune { code, name }).collect())
    }
}

fn io_error(e: &io::Error) -> LocationError {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => LocationError::Timeout(e.to_string()),
        _ => LocationError::Network(e.to_string()),
    }
}

fn transport_error(t: ureq::Transport) -> LocationError {
    let io_kind = std::error::Error::source(&t)
        .and_then(|s| s.downcast_ref::<io::Error>())
        .map(|e| e.kind());
    match io_kind {
        Some(io::ErrorKind::TimedOut) | Some(io::ErrorKind::WouldBlock) => {
            LocationError::Timeout(t.to_string())
        }
        _ => LocationError::Network(t.to_string()),
    }
}

/// Source used in offline mode: every call fails, so lookups go straight
/// to the built-in dataset.
pub struct OfflineSource;

impl RemoteSource for OfflineSource {
    fn fetch_regions(&self) -> RemoteResult<Region> {
        Err(LocationError::Offline)
    }

    fn fetch_communes(&self, _region_code: &str) -> RemoteResult<Commune> {
        Err(LocationError::Offline)
    }

    fn fetch_all_communes(&self) -> RemoteResult<Commune> {
        Err(LocationError::Offline)
    }
}

// ─── URL encoding (path segment) ────────────────────────────────

fn urlencod(s: &str) -> String {
    s.bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (b as char).to_string()
            }
            _ => format!("%{:02X}", b),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Serve one canned HTTP response on a random local port.
    fn serve_once(status: &'static str, body: &'static str, delay: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 2048];
                let _ = stream.read(&mut buf);
                thread::sleep(delay);
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });
        format!("http://{}", addr)
    }

    fn client(base: String) -> DpaClient {
        DpaClient::new(base, Duration::from_millis(500), Duration::from_millis(500))
    }

    #[test]
    fn test_builtin_has_all_regions() {
        let regions = builtin_regions();
        assert_eq!(regions.len(), 16);
        assert!(regions.iter().any(|r| r.code == "13" && r.name == "Metropolitana de Santiago"));
    }

    #[test]
    fn test_builtin_every_region_has_communes() {
        for region in builtin_regions() {
            let communes = builtin_communes(&region.code).unwrap();
            assert!(!communes.is_empty(), "region {} has no communes", region.code);
        }
    }

    #[test]
    fn test_builtin_communes_unpadded_code() {
        let padded = builtin_communes("05").unwrap();
        let unpadded = builtin_communes("5").unwrap();
        assert_eq!(padded, unpadded);
        assert!(padded.iter().any(|c| c.name == "Viña del Mar"));
    }

    #[test]
    fn test_builtin_unknown_region() {
        assert!(builtin_communes("99").is_none());
        assert!(builtin_communes("XX").is_none());
    }

    #[test]
    fn test_builtin_all_communes() {
        let all = builtin_all_communes();
        let per_region: usize = builtin_regions()
            .iter()
            .map(|r| builtin_communes(&r.code).unwrap().len())
            .sum();
        assert_eq!(all.len(), per_region);
    }

    #[test]
    fn test_decode_string_and_numeric_codes() {
        let body = r#"[{"codigo": "13", "nombre": "Metropolitana de Santiago", "tipo": "region"},
                       {"codigo": 5, "nombre": "Valparaíso"}]"#;
        let entries = decode_entries(body).unwrap();
        assert_eq!(entries[0], ("13".to_string(), "Metropolitana de Santiago".to_string()));
        assert_eq!(entries[1], ("5".to_string(), "Valparaíso".to_string()));
    }

    #[test]
    fn test_decode_rejects_empty_list() {
        assert!(matches!(decode_entries("[]"), Err(LocationError::Empty)));
    }

    #[test]
    fn test_decode_rejects_bad_entries() {
        assert!(matches!(
            decode_entries(r#"[{"codigo": "13"}]"#),
            Err(LocationError::InvalidResponse(_))
        ));
        assert!(matches!(
            decode_entries(r#"[{"codigo": "13", "nombre": "  "}]"#),
            Err(LocationError::InvalidResponse(_))
        ));
        assert!(matches!(
            decode_entries(r#"[{"codigo": null, "nombre": "X"}]"#),
            Err(LocationError::InvalidResponse(_))
        ));
        assert!(matches!(
            decode_entries(r#"[{"codigo": ["1"], "nombre": "X"}]"#),
            Err(LocationError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_decode_rejects_non_list() {
        assert!(matches!(
            decode_entries(r#"{"error": "rate limited"}"#),
            Err(LocationError::InvalidResponse(_))
        ));
        assert!(matches!(
            decode_entries("<html>"),
            Err(LocationError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_client_fetch_regions() {
        let base = serve_once(
            "200 OK",
            r#"[{"codigo": "13", "nombre": "Metropolitana de Santiago"}]"#,
            Duration::ZERO,
        );
        let regions = client(base).fetch_regions().unwrap();
        assert_eq!(regions, vec![Region::new("13", "Metropolitana de Santiago")]);
    }

    #[test]
    fn test_client_http_error_status() {
        let base = serve_once("503 Service Unavailable", "[]", Duration::ZERO);
        let err = client(base).fetch_communes("05").unwrap_err();
        assert!(matches!(err, LocationError::Status(503)));
    }

    #[test]
    fn test_client_malformed_body() {
        let base = serve_once("200 OK", "not json", Duration::ZERO);
        let err = client(base).fetch_all_communes().unwrap_err();
        assert!(matches!(err, LocationError::InvalidResponse(_)));
    }

    #[test]
    fn test_client_timeout() {
        let base = serve_once("200 OK", "[]", Duration::from_secs(3));
        let err = client(base).fetch_regions().unwrap_err();
        assert!(matches!(err, LocationError::Timeout(_) | LocationError::Network(_)));
    }

    #[test]
    fn test_client_connection_refused() {
        // Bind then drop to get a port nobody listens on
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let err = client(format!("http://127.0.0.1:{}", port)).fetch_regions().unwrap_err();
        assert!(matches!(err, LocationError::Network(_) | LocationError::Timeout(_)));
    }

    #[test]
    fn test_offline_source_always_fails() {
        assert!(OfflineSource.fetch_regions().is_err());
        assert!(OfflineSource.fetch_communes("13").is_err());
        assert!(OfflineSource.fetch_all_communes().is_err());
    }

    #[test]
    fn test_urlencod() {
        assert_eq!(urlencod("05"), "05");
        assert_eq!(urlencod("a/b c"), "a%2Fb%20c");
    }
}
