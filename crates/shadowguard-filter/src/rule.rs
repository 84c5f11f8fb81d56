//! Rule types shared by the parser, compiler and decision engine.

use std::collections::HashSet;
use std::str::FromStr;

/// What a matching network rule does to the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleAction {
    /// Block the request.
    Block,
    /// Exempt the request from blocking (`@@` rules).
    Allow,
}

/// Which side of the page/request relationship a rule is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    /// Request domain differs from the initiating page's site.
    Third,
    /// Request domain belongs to the initiating page's site.
    First,
}

/// Request classes a rule can be narrowed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Script,
    Image,
    Stylesheet,
    Xhr,
    Document,
    Font,
    Media,
    Websocket,
    Other,
}

impl FromStr for ResourceType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "script" => Self::Script,
            "image" => Self::Image,
            "stylesheet" => Self::Stylesheet,
            "xhr" => Self::Xhr,
            "document" => Self::Document,
            "font" => Self::Font,
            "media" => Self::Media,
            "websocket" => Self::Websocket,
            "other" => Self::Other,
            _ => return Err(()),
        })
    }
}

impl ResourceType {
    /// Guess the resource class from the URL's path extension. A proxy sees
    /// no fetch metadata, so the extension is the best signal available;
    /// anything unrecognized counts as a document fetch.
    pub fn infer_from_url(url: &str) -> Self {
        let path = url
            .split_once("://")
            .map_or(url, |(_, rest)| rest)
            .split(['?', '#'])
            .next()
            .unwrap_or_default();
        let ext = path
            .rsplit('/')
            .next()
            .and_then(|file| file.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase());

        match ext.as_deref() {
            Some("js" | "mjs") => Self::Script,
            Some("css") => Self::Stylesheet,
            Some("png" | "jpg" | "jpeg" | "gif" | "webp" | "svg" | "ico" | "bmp" | "avif") => {
                Self::Image
            }
            Some("woff" | "woff2" | "ttf" | "otf" | "eot") => Self::Font,
            Some("mp4" | "webm" | "m3u8" | "ts" | "mp3" | "ogg" | "wav" | "flac") => Self::Media,
            Some("json" | "xml") => Self::Xhr,
            _ => Self::Document,
        }
    }
}

/// The `$option` tail of a network rule, already validated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleOptions {
    /// `third-party` / `1p` / `~third-party` scoping.
    pub party: Option<Party>,
    /// Resource classes the rule applies to; `None` means all.
    pub resource_types: Option<HashSet<ResourceType>>,
    /// `domain=a|b` inclusion list (initiating domain, exact or dot-suffix).
    pub include_domains: Vec<String>,
    /// `domain=~c` exclusion list.
    pub exclude_domains: Vec<String>,
    /// `important`: this block survives allow rules.
    pub important: bool,
    /// `redirect=target`: rewrite instead of blocking.
    pub redirect: Option<String>,
}

impl RuleOptions {
    /// True when the rule constrains nothing beyond its pattern (such rules
    /// are eligible for the domain index fast path).
    pub fn is_unconstrained(&self) -> bool {
        self.party.is_none()
            && self.resource_types.is_none()
            && self.include_domains.is_empty()
            && self.exclude_domains.is_empty()
            && self.redirect.is_none()
    }
}

/// A cosmetic (element-hiding) rule. Surfaced to the shell; the traffic core
/// never consumes these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CosmeticRule {
    /// CSS selector (or procedural selector body) to hide.
    pub selector: String,
    /// Domains the rule is scoped to; empty means everywhere.
    pub domains: Vec<String>,
    /// `#@#` exception rules un-hide instead.
    pub exception: bool,
}
