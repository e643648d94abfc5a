//! Region identity annotation.

use crate::context::RequestContext;

use http::{HeaderName, HeaderValue};
use log::debug;

/// Cookie keys carrying the region identity.
const REGION_COOKIES: [&str; 2] = ["city", "selected_region"];
/// Header names carrying the region identity.
const REGION_HEADERS: [&str; 2] = ["x-region", "x-city"];

/// Attaches region identity (cookies + headers) to outbound requests.
///
/// Annotation is insert-if-absent: values already set by spider logic or a
/// prior response's `Set-Cookie` are never overwritten, and re-applying to an
/// already-annotated request is a no-op.
#[derive(Debug, Clone)]
pub struct RegionAnnotator {
    region: String,
    capitalized: String,
}

impl RegionAnnotator {
    /// Create an annotator for `region`. The region is lowercased for cookie
    /// values; headers carry the capitalized form.
    pub fn new(region: &str) -> Self {
        let region = region.to_lowercase();
        let capitalized = capitalize(&region);
        Self { region, capitalized }
    }

    /// The configured region, lowercased.
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Apply region cookies and headers to the request. Pure transformation
    /// of the context's maps; no error conditions.
    pub fn annotate(&self, ctx: &mut RequestContext) {
        for key in REGION_COOKIES {
            ctx.cookie_if_absent(key, &self.region);
        }

        for name in REGION_HEADERS {
            // Statically known names and a capitalized region value are
            // always valid header tokens.
            let name = HeaderName::from_static(name);
            if let Ok(value) = HeaderValue::from_str(&self.capitalized) {
                ctx.header_if_absent(name, value);
            }
        }

        ctx.region_applied = true;
        debug!("Region {} applied to {}", self.region, ctx.url);
    }
}

/// First character uppercased, the rest lowercased.
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
