//! Input resolution: query strings and JSON bodies become a [`CaptureJob`].
//!
//! Both request shapes produce the same job. Only the URL is validated here;
//! other malformed values fall back to defaults or are handed to the renderer
//! as-is, where the capture step rejects them.

use log::warn;
use serde::Deserialize;
use serde_json::Value;

use crate::{CaptureJob, ClipRegion, Error, ImageType, Result, Viewport, DEFAULT_QUALITY};

pub const URL_REQUIRED: &str = "URL is required";

/// Raw `GET /capture` query parameters
///
/// Every field is kept as a string so a bad value never fails extraction;
/// parsing and fallbacks happen in [`JobResolver::from_query`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureQuery {
    pub url: Option<String>,
    pub full_page: Option<String>,
    pub quality: Option<String>,
    pub image_type: Option<String>,
    pub viewport_width: Option<String>,
    pub viewport_height: Option<String>,
    pub device_scale_factor: Option<String>,
    pub clip: Option<String>,
    pub wait_for_selector: Option<String>,
}

impl CaptureQuery {
    /// Parse a raw (still percent-encoded) query string.
    pub fn parse(raw: Option<&str>) -> Result<Self> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(raw.unwrap_or(""))
            .map_err(|e| Error::Other(format!("Invalid query string: {}", e)))?;
        Ok(Self::from_pairs(pairs))
    }

    /// Build from decoded key/value pairs. When a key repeats, its first
    /// value is used; unknown keys are ignored.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut query = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_str() {
                "url" => &mut query.url,
                "fullPage" => &mut query.full_page,
                "quality" => &mut query.quality,
                "type" => &mut query.image_type,
                "viewportWidth" => &mut query.viewport_width,
                "viewportHeight" => &mut query.viewport_height,
                "deviceScaleFactor" => &mut query.device_scale_factor,
                "clip" => &mut query.clip,
                "waitForSelector" => &mut query.wait_for_selector,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }
        query
    }
}

/// `POST /capture` JSON body
///
/// Fields stay untyped JSON and are coerced during resolution, so a wrongly
/// typed value degrades to a default instead of rejecting the request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureBody {
    pub url: Option<Value>,
    pub full_page: Option<Value>,
    pub quality: Option<Value>,
    #[serde(rename = "type")]
    pub image_type: Option<Value>,
    pub viewport: Option<Value>,
    pub clip: Option<Value>,
    pub wait_for_selector: Option<Value>,
}

/// Turns either request shape into a [`CaptureJob`].
#[derive(Debug, Clone, Default)]
pub struct JobResolver {
    /// Fills in viewport fields a request leaves out
    pub default_viewport: Viewport,
}

impl JobResolver {
    pub fn new(default_viewport: Viewport) -> Self {
        Self { default_viewport }
    }

    pub fn from_query(&self, query: &CaptureQuery) -> Result<CaptureJob> {
        let url = require_url(query.url.as_deref().map(decode_component))?;

        let viewport = if query.viewport_width.is_some()
            || query.viewport_height.is_some()
            || query.device_scale_factor.is_some()
        {
            Some(Viewport {
                width: parse_dimension(query.viewport_width.as_deref())
                    .unwrap_or(self.default_viewport.width),
                height: parse_dimension(query.viewport_height.as_deref())
                    .unwrap_or(self.default_viewport.height),
                device_scale_factor: query
                    .device_scale_factor
                    .as_deref()
                    .and_then(leading_float)
                    .filter(|f| f.is_finite() && *f > 0.0)
                    .unwrap_or(self.default_viewport.device_scale_factor),
            })
        } else {
            None
        };

        let clip = non_empty(query.clip.as_deref()).and_then(|raw| match raw.parse::<ClipRegion>() {
            Ok(clip) => Some(clip),
            Err(e) => {
                warn!("Ignoring clip: {}", e);
                None
            }
        });

        Ok(CaptureJob {
            url,
            full_page: query.full_page.as_deref() != Some("false"),
            quality: non_empty(query.quality.as_deref())
                .and_then(leading_int)
                .map(clamp_quality)
                .unwrap_or(DEFAULT_QUALITY),
            image_type: non_empty(query.image_type.as_deref())
                .map(ImageType::from)
                .unwrap_or_default(),
            viewport,
            clip,
            wait_for_selector: non_empty(query.wait_for_selector.as_deref()).map(str::to_string),
        })
    }

    pub fn from_body(&self, body: &CaptureBody) -> Result<CaptureJob> {
        let url = require_url(body.url.as_ref().filter(|v| truthy(v)).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }))?;

        let viewport = match &body.viewport {
            Some(Value::Object(v)) => {
                let dimension = |key: &str| {
                    v.get(key)
                        .and_then(number)
                        .filter(|n| n.is_finite() && *n >= 1.0)
                        .map(|n| n.round().min(u32::MAX as f64) as u32)
                };
                Some(Viewport {
                    width: dimension("width").unwrap_or(self.default_viewport.width),
                    height: dimension("height").unwrap_or(self.default_viewport.height),
                    device_scale_factor: v
                        .get("deviceScaleFactor")
                        .and_then(number)
                        .filter(|f| f.is_finite() && *f > 0.0)
                        .unwrap_or(self.default_viewport.device_scale_factor),
                })
            }
            _ => None,
        };

        let clip = body.clip.as_ref().filter(|v| !v.is_null()).and_then(|v| {
            match serde_json::from_value::<ClipRegion>(v.clone()) {
                Ok(clip) => Some(clip),
                Err(e) => {
                    warn!("Ignoring clip {}: {}", v, e);
                    None
                }
            }
        });

        Ok(CaptureJob {
            url,
            full_page: body.full_page.as_ref().map(truthy).unwrap_or(true),
            quality: body
                .quality
                .as_ref()
                .and_then(number)
                .filter(|q| q.is_finite())
                .map(|q| clamp_quality(q.round() as i64))
                .unwrap_or(DEFAULT_QUALITY),
            image_type: match &body.image_type {
                Some(Value::String(s)) if !s.is_empty() => ImageType::from(s.as_str()),
                Some(other) if truthy(other) => ImageType::Other(other.to_string()),
                _ => ImageType::Png,
            },
            viewport,
            clip,
            wait_for_selector: match &body.wait_for_selector {
                Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                _ => None,
            },
        })
    }

    /// Parses a raw JSON body. A body that is not a JSON object cannot be
    /// read at all and is an internal error, not a validation failure.
    pub fn from_json(&self, raw: &[u8]) -> Result<CaptureJob> {
        let body: CaptureBody = serde_json::from_slice(raw)
            .map_err(|e| Error::Other(format!("Invalid request body: {}", e)))?;
        self.from_body(&body)
    }
}

fn require_url(url: Option<String>) -> Result<String> {
    match url {
        Some(u) if !u.is_empty() => Ok(u),
        _ => Err(Error::ValidationError(URL_REQUIRED.into())),
    }
}

/// Second percent-decoding pass for query URLs; the query parser already
/// decoded once. Invalid sequences leave the value untouched.
fn decode_component(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

fn parse_dimension(raw: Option<&str>) -> Option<u32> {
    raw.and_then(|v| v.trim().parse::<u32>().ok()).filter(|v| *v > 0)
}

/// Integer at the start of `raw`: `"55.9"` is 55, `"12abc"` is 12.
fn leading_int(raw: &str) -> Option<i64> {
    let s = raw.trim_start();
    let sign_len = usize::from(s.starts_with(['+', '-']));
    let digits = s[sign_len..].bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let n = &s[..sign_len + digits];
    // Overlong digit runs saturate
    Some(n.parse::<i64>().unwrap_or(if n.starts_with('-') { i64::MIN } else { i64::MAX }))
}

/// Decimal number at the start of `raw`: `"2.5x"` is 2.5.
fn leading_float(raw: &str) -> Option<f64> {
    let s = raw.trim_start();
    let bytes = s.as_bytes();
    let mut end = usize::from(s.starts_with(['+', '-']));
    let int_digits = bytes[end..].iter().take_while(|b| b.is_ascii_digit()).count();
    end += int_digits;
    let mut frac_digits = 0;
    if bytes.get(end) == Some(&b'.') {
        frac_digits = bytes[end + 1..].iter().take_while(|b| b.is_ascii_digit()).count();
        if frac_digits > 0 || int_digits > 0 {
            end += 1 + frac_digits;
        }
    }
    if int_digits + frac_digits == 0 {
        return None;
    }
    s[..end].parse().ok()
}

/// Numeric value of a JSON field with the loose coercions of an untyped
/// client: numeric strings, booleans and null count, anything else does not.
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Null => Some(0.0),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                Some(0.0)
            } else {
                s.parse::<f64>().ok().filter(|n| n.is_finite())
            }
        }
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn clamp_quality(q: i64) -> u8 {
    q.clamp(0, 100) as u8
}

fn non_empty(raw: Option<&str>) -> Option<&str> {
    raw.filter(|s| !s.is_empty())
}
