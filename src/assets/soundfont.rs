// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::sync::Arc;

use base64::Engine as _;
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use serde::Deserialize;
use serde_json::{Number, Value};
use tracing::{info, warn};

use super::{decode_blocking, AssetCache, AssetError, Fetcher};
use crate::audio::graph::LoopRegion;
use crate::audio::AudioBuffer;
use crate::config::SoundfontConfig;

#[derive(Parser)]
#[grammar = "src/assets/soundfont.pest"]
struct SoundfontParser;

/// General MIDI instrument names by category, in program order.
static GM_CATEGORIES: [(&str, [&str; 8]); 16] = [
    ("Piano", ["gm_piano", "gm_bright_piano", "gm_electric_grand", "gm_honky_tonk", "gm_epiano1", "gm_epiano2", "gm_harpsichord", "gm_clavinet"]),
    ("Chromatic", ["gm_celesta", "gm_glockenspiel", "gm_music_box", "gm_vibraphone", "gm_marimba", "gm_xylophone", "gm_tubular_bells", "gm_dulcimer"]),
    ("Organ", ["gm_drawbar_organ", "gm_percussive_organ", "gm_rock_organ", "gm_church_organ", "gm_reed_organ", "gm_accordion", "gm_harmonica", "gm_bandoneon"]),
    ("Guitar", ["gm_acoustic_guitar_nylon", "gm_acoustic_guitar_steel", "gm_electric_guitar_jazz", "gm_electric_guitar_clean", "gm_electric_guitar_muted", "gm_overdriven_guitar", "gm_distortion_guitar", "gm_guitar_harmonics"]),
    ("Bass", ["gm_acoustic_bass", "gm_electric_bass_finger", "gm_electric_bass_pick", "gm_fretless_bass", "gm_slap_bass_1", "gm_slap_bass_2", "gm_synth_bass_1", "gm_synth_bass_2"]),
    ("Strings", ["gm_violin", "gm_viola", "gm_cello", "gm_contrabass", "gm_tremolo_strings", "gm_pizzicato_strings", "gm_orchestral_harp", "gm_timpani"]),
    ("Ensemble", ["gm_string_ensemble_1", "gm_string_ensemble_2", "gm_synth_strings_1", "gm_synth_strings_2", "gm_choir_aahs", "gm_voice_oohs", "gm_synth_choir", "gm_orchestra_hit"]),
    ("Brass", ["gm_trumpet", "gm_trombone", "gm_tuba", "gm_muted_trumpet", "gm_french_horn", "gm_brass_section", "gm_synth_brass_1", "gm_synth_brass_2"]),
    ("Reed", ["gm_soprano_sax", "gm_alto_sax", "gm_tenor_sax", "gm_baritone_sax", "gm_oboe", "gm_english_horn", "gm_bassoon", "gm_clarinet"]),
    ("Pipe", ["gm_piccolo", "gm_flute", "gm_recorder", "gm_pan_flute", "gm_blown_bottle", "gm_shakuhachi", "gm_whistle", "gm_ocarina"]),
    ("Synth Lead", ["gm_lead_1_square", "gm_lead_2_sawtooth", "gm_lead_3_calliope", "gm_lead_4_chiff", "gm_lead_5_charang", "gm_lead_6_voice", "gm_lead_7_fifths", "gm_lead_8_bass_lead"]),
    ("Synth Pad", ["gm_pad_new_age", "gm_pad_warm", "gm_pad_poly", "gm_pad_choir", "gm_pad_bowed", "gm_pad_metallic", "gm_pad_halo", "gm_pad_sweep"]),
    ("Synth FX", ["gm_fx_rain", "gm_fx_soundtrack", "gm_fx_crystal", "gm_fx_atmosphere", "gm_fx_brightness", "gm_fx_goblins", "gm_fx_echoes", "gm_fx_sci_fi"]),
    ("Ethnic", ["gm_sitar", "gm_banjo", "gm_shamisen", "gm_koto", "gm_kalimba", "gm_bagpipe", "gm_fiddle", "gm_shanai"]),
    ("Percussive", ["gm_tinkle_bell", "gm_agogo", "gm_steel_drums", "gm_woodblock", "gm_taiko_drum", "gm_melodic_tom", "gm_synth_drum", "gm_reverse_cymbal"]),
    ("Sound FX", ["gm_guitar_fret_noise", "gm_breath_noise", "gm_seashore", "gm_bird_tweet", "gm_telephone", "gm_helicopter", "gm_applause", "gm_gunshot"]),
];

/// The General MIDI program number of an instrument name.
pub fn gm_program(name: &str) -> Option<u8> {
    GM_CATEGORIES
        .iter()
        .flat_map(|(_, names)| names.iter())
        .position(|candidate| *candidate == name)
        .map(|program| program as u8)
}

/// The soundfont file name, without extension, for a General MIDI instrument.
pub fn file_prefix(name: &str) -> Option<String> {
    gm_program(name).map(|program| format!("{:03}0_GeneralUserGS_sf2_file", program))
}

/// One key range of a sampled instrument.
#[derive(Clone, PartialEq)]
pub struct Zone {
    key_range_low: u8,
    key_range_high: u8,
    original_pitch: f32,
    loop_start: f64,
    loop_end: f64,
    sample_rate: u32,
    buffer: Option<Arc<AudioBuffer>>,
}

impl Zone {
    pub fn new(
        key_range_low: u8,
        key_range_high: u8,
        original_pitch: f32,
        loop_start: f64,
        loop_end: f64,
        sample_rate: u32,
    ) -> Zone {
        Zone {
            key_range_low,
            key_range_high,
            original_pitch,
            loop_start,
            loop_end,
            sample_rate,
            buffer: None,
        }
    }

    pub fn with_buffer(mut self, buffer: Arc<AudioBuffer>) -> Zone {
        self.buffer = Some(buffer);
        self
    }

    /// The decoded audio, if decoding succeeded.
    pub fn buffer(&self) -> Option<&Arc<AudioBuffer>> {
        self.buffer.as_ref()
    }

    /// Recorded pitch in MIDI cents.
    pub fn original_pitch(&self) -> f32 {
        self.original_pitch
    }

    pub fn key_range(&self) -> (u8, u8) {
        (self.key_range_low, self.key_range_high)
    }

    pub fn contains(&self, midi_note: u8) -> bool {
        (self.key_range_low..=self.key_range_high).contains(&midi_note)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Loop points in seconds. Zones loop only when both points are set and
    /// the end lies after the start.
    pub fn loop_region(&self) -> Option<LoopRegion> {
        if self.loop_start == 0.0 || self.loop_end == 0.0 || self.loop_end <= self.loop_start {
            return None;
        }
        let sample_rate = f64::from(self.sample_rate.max(1));
        Some(LoopRegion {
            start: self.loop_start / sample_rate,
            end: self.loop_end / sample_rate,
        })
    }
}

impl std::fmt::Debug for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Zone")
            .field("key_range", &self.key_range())
            .field("original_pitch", &self.original_pitch)
            .field("loop", &self.loop_region())
            .field("sample_rate", &self.sample_rate)
            .field("decoded", &self.buffer.is_some())
            .finish()
    }
}

/// A loaded soundfont instrument: its zones in file order.
#[derive(Clone, Debug)]
pub struct Instrument {
    name: String,
    zones: Vec<Zone>,
}

impl Instrument {
    pub fn new(name: &str, zones: Vec<Zone>) -> Instrument {
        Instrument {
            name: name.to_string(),
            zones,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    /// The first zone whose key range holds `midi_note`, otherwise the first
    /// zone of the instrument.
    pub fn find_zone(&self, midi_note: u8) -> Option<&Zone> {
        self.zones
            .iter()
            .find(|zone| zone.contains(midi_note))
            .or_else(|| self.zones.first())
    }
}

#[derive(Deserialize)]
struct SoundfontData {
    #[serde(default)]
    zones: Vec<ZoneData>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ZoneData {
    #[serde(default)]
    original_pitch: f64,
    #[serde(default)]
    key_range_low: f64,
    #[serde(default = "default_key_range_high")]
    key_range_high: f64,
    #[serde(default)]
    loop_start: f64,
    #[serde(default)]
    loop_end: f64,
    #[serde(default = "default_zone_sample_rate")]
    sample_rate: f64,
    #[serde(default)]
    file: Option<String>,
}

fn default_key_range_high() -> f64 {
    127.0
}

fn default_zone_sample_rate() -> f64 {
    44_100.0
}

/// Parses a soundfont script into its object literal.
fn parse_script(content: &str) -> Result<Value, AssetError> {
    let mut pairs = SoundfontParser::parse(Rule::file, content).map_err(|e| {
        let (line, col) = match e.line_col {
            pest::error::LineColLocation::Pos((line, col)) => (line, col),
            pest::error::LineColLocation::Span((line, col), _) => (line, col),
        };
        AssetError::SoundfontParse(format!(
            "line {}, column {}: {}",
            line,
            col,
            e.variant.message()
        ))
    })?;

    let declaration = pairs
        .next()
        .into_iter()
        .flat_map(|file| file.into_inner())
        .find(|pair| pair.as_rule() == Rule::declaration)
        .ok_or_else(|| AssetError::SoundfontParse("no declaration found".to_string()))?;

    declaration
        .into_inner()
        .nth(2)
        .map(to_value)
        .ok_or_else(|| AssetError::SoundfontParse("declaration has no value".to_string()))
}

fn to_value(pair: Pair<Rule>) -> Value {
    match pair.as_rule() {
        Rule::object => {
            let mut map = serde_json::Map::new();
            for entry in pair.into_inner() {
                let mut parts = entry.into_inner();
                let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
                    continue;
                };
                let key = match key.as_rule() {
                    Rule::string => unescape(key),
                    _ => key.as_str().to_string(),
                };
                map.insert(key, to_value(value));
            }
            Value::Object(map)
        }
        Rule::array => Value::Array(pair.into_inner().map(to_value).collect()),
        Rule::string => Value::String(unescape(pair)),
        Rule::number => parse_number(pair.as_str())
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Rule::boolean => Value::Bool(pair.as_str() == "true"),
        _ => Value::Null,
    }
}

fn parse_number(text: &str) -> Option<f64> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let value = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok()? as f64,
        None => digits.parse::<f64>().ok()?,
    };
    Some(if negative { -value } else { value })
}

fn unescape(pair: Pair<Rule>) -> String {
    let raw = pair.into_inner().next().map(|inner| inner.as_str()).unwrap_or_default();
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('u') => {
                let code: String = chars.by_ref().take(4).collect();
                if let Some(decoded) = u32::from_str_radix(&code, 16).ok().and_then(char::from_u32) {
                    out.push(decoded);
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Splits an optional `data:audio/...;base64,` prefix from a payload and
/// decodes it. Returns the bytes and the subtype as a decoder hint.
fn decode_payload(payload: &str) -> Result<(Vec<u8>, Option<String>), AssetError> {
    let (hint, data) = match payload.strip_prefix("data:") {
        Some(rest) => match rest.split_once(',') {
            Some((header, data)) => {
                let subtype = header
                    .split(';')
                    .next()
                    .and_then(|mime| mime.split_once('/'))
                    .map(|(_, subtype)| subtype.to_ascii_lowercase());
                (subtype, data)
            }
            None => (None, rest),
        },
        None => (None, payload),
    };
    let cleaned: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD.decode(cleaned)?;
    let hint = hint.map(|subtype| match subtype.as_str() {
        "mpeg" => "mp3".to_string(),
        _ => subtype,
    });
    Ok((bytes, hint))
}

fn key(value: f64) -> u8 {
    value.clamp(0.0, 127.0) as u8
}

async fn decode_zone(instrument: &str, index: usize, data: ZoneData) -> Zone {
    let zone = Zone::new(
        key(data.key_range_low),
        key(data.key_range_high),
        data.original_pitch as f32,
        data.loop_start,
        data.loop_end,
        data.sample_rate.max(1.0) as u32,
    );
    let Some(file) = data.file.filter(|file| !file.is_empty()) else {
        return zone;
    };

    let decoded = match decode_payload(&file) {
        Ok((bytes, hint)) => decode_blocking(bytes, hint).await,
        Err(e) => Err(e),
    };
    match decoded {
        Ok(buffer) => zone.with_buffer(Arc::new(buffer)),
        Err(e) => {
            warn!(instrument, zone = index, err = %e, "Failed to decode soundfont zone");
            zone
        }
    }
}

/// Parses a soundfont script and decodes the audio of every zone.
pub async fn parse_instrument(name: &str, content: &str) -> Result<Instrument, AssetError> {
    let value = parse_script(content)?;
    let data: SoundfontData = serde_json::from_value(value)
        .map_err(|e| AssetError::SoundfontParse(e.to_string()))?;

    let mut zones = Vec::with_capacity(data.zones.len());
    for (index, zone) in data.zones.into_iter().enumerate() {
        zones.push(decode_zone(name, index, zone).await);
    }
    Ok(Instrument::new(name, zones))
}

/// Loads and caches General MIDI soundfont instruments.
pub struct SoundfontLoader {
    fetcher: Arc<dyn Fetcher>,
    base_url: String,
    cache: AssetCache<String, Instrument>,
}

impl SoundfontLoader {
    pub fn new(fetcher: Arc<dyn Fetcher>, config: &SoundfontConfig) -> SoundfontLoader {
        SoundfontLoader {
            fetcher,
            base_url: config.base_url().to_string(),
            cache: AssetCache::new(),
        }
    }

    /// Every known instrument name, sorted.
    pub fn available_instruments(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = GM_CATEGORIES
            .iter()
            .flat_map(|(_, names)| names.iter().copied())
            .collect();
        names.sort_unstable();
        names
    }

    /// Instrument names grouped by category, in program order.
    pub fn instruments_by_category(&self) -> Vec<(&'static str, &'static [&'static str])> {
        GM_CATEGORIES
            .iter()
            .map(|(category, names)| (*category, names.as_slice()))
            .collect()
    }

    pub fn is_gm_instrument(&self, name: &str) -> bool {
        gm_program(name).is_some()
    }

    /// Returns a loaded instrument without fetching.
    pub fn cached(&self, name: &str) -> Option<Arc<Instrument>> {
        self.cache.get(&name.to_string())
    }

    /// Loads an instrument, serving it from the cache when possible. Any
    /// failure is logged and reported as `None`.
    pub async fn load_instrument(&self, name: &str) -> Option<Arc<Instrument>> {
        let Some(prefix) = file_prefix(name) else {
            warn!(instrument = name, err = %AssetError::UnknownInstrument(name.to_string()), "Instrument unavailable");
            return None;
        };
        let url = format!("{}{}.js", self.base_url, prefix);

        let fetcher = self.fetcher.clone();
        self.cache
            .get_or_load(name.to_string(), || async move {
                match fetch_instrument(fetcher.as_ref(), name, &url).await {
                    Ok(instrument) => {
                        info!(instrument = name, zones = instrument.zones().len(), "Instrument loaded");
                        Some(instrument)
                    }
                    Err(e) => {
                        warn!(instrument = name, url = %url, err = %e, "Failed to load instrument");
                        None
                    }
                }
            })
            .await
    }

    /// Finds the zone of a cached instrument for `midi_note`.
    pub fn find_zone(&self, name: &str, midi_note: u8) -> Option<Zone> {
        self.cached(name)?.find_zone(midi_note).cloned()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        info!("Soundfont cache cleared");
    }

    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }
}

async fn fetch_instrument(
    fetcher: &dyn Fetcher,
    name: &str,
    url: &str,
) -> Result<Instrument, AssetError> {
    let bytes = fetcher.fetch(url).await?;
    let content = String::from_utf8_lossy(&bytes);
    parse_instrument(name, &content).await
}

impl std::fmt::Debug for SoundfontLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoundfontLoader")
            .field("base_url", &self.base_url)
            .field("cache_size", &self.cache.len())
            .finish()
    }
}
