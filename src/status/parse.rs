//! Parsers for console replies: `list` and the tick-rate commands.

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PlayerList {
    pub online: u32,
    pub max: u32,
    pub players: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TickStats {
    pub tps: f64,
    /// Mean milliseconds per tick, when the server reports it
    pub mean_tick_ms: Option<f64>,
    /// Which reply format produced these numbers
    pub source: TickSource,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TickSource {
    Forge,
    Simple,
}

fn player_list_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    // "of a max of" (vanilla) and "of a max" (older servers) are both accepted
    RE.get_or_init(|| {
        Regex::new(r"There are (\d+) of a max(?: of)? (\d+) players online:\s?(.*)").ok()
    })
    .as_ref()
}

fn forge_mean_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    // Forge 1.12-1.16: "Overall : Mean tick time: 1.234 ms. Mean TPS: 20.000"
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?P<dim>.+?)\s*:\s*Mean tick time:\s*(?P<ms>[\d.]+)\s*ms\.?\s*Mean TPS:\s*(?P<tps>[\d.]+)").ok()
    })
    .as_ref()
}

fn forge_modern_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    // Forge 1.17+: "Overall: 20.000 TPS (2.808 ms/tick)"
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?P<dim>.+?)\s*:\s*(?P<tps>[\d.]+)\s*TPS\s*\((?P<ms>[\d.]+)\s*ms/tick\)").ok()
    })
    .as_ref()
}

fn simple_tps_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    // Paper/Spigot: "TPS from last 1m, 5m, 15m: 20.0, 19.98, *20.0"
    RE.get_or_init(|| {
        Regex::new(r"TPS from last [^:]*:\s*\*?(?P<tps>[\d.]+)").ok()
    })
    .as_ref()
}

/// Remove `§x` colour/format codes.
pub fn strip_formatting(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '§' {
            chars.next();
        } else {
            out.push(c);
        }
    }
    out
}

/// Parse the reply to `list`. `None` when the reply has another shape.
pub fn parse_player_list(reply: &str) -> Option<PlayerList> {
    let clean = strip_formatting(reply);
    let caps = player_list_regex()?.captures(&clean)?;
    let online = caps.get(1)?.as_str().parse().ok()?;
    let max = caps.get(2)?.as_str().parse().ok()?;
    let players = caps
        .get(3)
        .map(|m| {
            m.as_str()
                .split(',')
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect()
        })
        .unwrap_or_default();
    Some(PlayerList { online, max, players })
}

/// Parse a tick-rate reply in either the Forge or the simple format.
/// For Forge, the `Overall` line wins; otherwise the first dimension line.
pub fn parse_tick_stats(reply: &str) -> Option<TickStats> {
    let clean = strip_formatting(reply);

    let mut first_dim = None;
    for line in clean.lines() {
        let caps = forge_mean_regex()
            .and_then(|re| re.captures(line))
            .or_else(|| forge_modern_regex().and_then(|re| re.captures(line)));
        let Some(caps) = caps else { continue };
        let (Some(tps), Some(ms)) = (
            caps.name("tps").and_then(|m| m.as_str().parse::<f64>().ok()),
            caps.name("ms").and_then(|m| m.as_str().parse::<f64>().ok()),
        ) else {
            continue;
        };
        let stats = TickStats {
            tps,
            mean_tick_ms: Some(ms),
            source: TickSource::Forge,
        };
        let is_overall = caps
            .name("dim")
            .map(|d| d.as_str().trim().eq_ignore_ascii_case("overall"))
            .unwrap_or(false);
        if is_overall {
            return Some(stats);
        }
        first_dim.get_or_insert(stats);
    }
    if first_dim.is_some() {
        return first_dim;
    }

    let caps = simple_tps_regex()?.captures(&clean)?;
    let tps = caps.name("tps")?.as_str().parse().ok()?;
    Some(TickStats {
        tps,
        mean_tick_ms: None,
        source: TickSource::Simple,
    })
}
