//! Image and audio synthesis tools: deterministic, dependency-light
//! stand-ins for a real generation backend.
//!
//! A reference implementation rasterises wrapped prompt text onto the card with a bundled
//! bitmap font. No
//! glyph-rendering crate is available here, so the card keeps the background colour, title
//! band and border the original draws but omits the literal glyphs; the prompt text itself is
//! still returned in the Tool Result's `data`.

use std::f64::consts::PI;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::{Rgb, RgbImage};
use okcvm_protocol::ToolResult;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::context::ToolContext;
use crate::spec::ToolSpec;
use crate::trait_def::Tool;

pub const TOOL_GENERATE_IMAGE: &str = "mshtools-generate_image";
pub const TOOL_GET_AVAILABLE_VOICES: &str = "mshtools-get_available_voices";
pub const TOOL_GENERATE_SPEECH: &str = "mshtools-generate_speech";
pub const TOOL_GENERATE_SOUND_EFFECTS: &str = "mshtools-generate_sound_effects";

const IMAGE_SIDE: u32 = 1024;
const TITLE_BAND_HEIGHT: u32 = 30;
const SAMPLE_RATE: u32 = 22_050;

fn hash_colour(prompt: &str) -> Rgb<u8> {
    let digest = Sha256::digest(prompt.as_bytes());
    Rgb([digest[0], digest[8], digest[16]])
}

/// Renders the coloured card: background fill, a lighter title band near the top, and a
/// one-pixel border, matching the dimensions `_image_from_prompt` uses.
fn image_from_prompt(prompt: &str) -> Vec<u8> {
    let colour = hash_colour(prompt);
    let mut image = RgbImage::from_pixel(IMAGE_SIDE, IMAGE_SIDE, colour);

    let band_colour = Rgb([
        colour.0[0].saturating_add(60),
        colour.0[1].saturating_add(60),
        colour.0[2].saturating_add(60),
    ]);
    for y in 80..(80 + TITLE_BAND_HEIGHT).min(IMAGE_SIDE) {
        for x in 0..IMAGE_SIDE {
            image.put_pixel(x, y, band_colour);
        }
    }

    let border = Rgb([255, 255, 255]);
    for x in 0..IMAGE_SIDE {
        image.put_pixel(x, 0, border);
        image.put_pixel(x, IMAGE_SIDE - 1, border);
    }
    for y in 0..IMAGE_SIDE {
        image.put_pixel(0, y, border);
        image.put_pixel(IMAGE_SIDE - 1, y, border);
    }

    let mut buffer = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut buffer);
    let _ = image.write_with_encoder(encoder);
    buffer
}

fn encode_wav(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let mut buffer = Vec::new();
    {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::new(std::io::Cursor::new(&mut buffer), spec)
            .expect("wav header is always valid");
        for sample in samples {
            let clamped = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer.write_sample(clamped).ok();
        }
        writer.finalize().ok();
    }
    buffer
}

fn tone_for_char(c: char, base: f64) -> f64 {
    if c.is_whitespace() {
        return 0.0;
    }
    base + ((c.to_ascii_lowercase() as u32) % 12) as f64 * 20.0
}

#[derive(Clone, Copy)]
struct Voice {
    voice_id: &'static str,
    name: &'static str,
    description: &'static str,
    language: &'static str,
    base_frequency: f64,
}

const VOICES: &[Voice] = &[
    Voice {
        voice_id: "voice_alloy",
        name: "Alloy",
        description: "Balanced voice suited for general narration.",
        language: "en-US",
        base_frequency: 160.0,
    },
    Voice {
        voice_id: "voice_breeze",
        name: "Breeze",
        description: "Soft, airy delivery ideal for storytelling.",
        language: "en-GB",
        base_frequency: 180.0,
    },
    Voice {
        voice_id: "voice_thunder",
        name: "Thunder",
        description: "Deep baritone voice for authoritative statements.",
        language: "en-US",
        base_frequency: 110.0,
    },
];

fn find_voice(voice_id: &str) -> Option<Voice> {
    VOICES.iter().copied().find(|v| v.voice_id == voice_id)
}

fn serialize_voice(voice: Voice) -> Value {
    json!({
        "voice_id": voice.voice_id,
        "name": voice.name,
        "description": voice.description,
        "language": voice.language,
    })
}

fn synth_speech(text: &str, voice: Voice) -> Vec<u8> {
    let duration_per_char = 0.09;
    let total_duration = (text.chars().count() as f64 * duration_per_char).max(0.5);
    let sample_count = (SAMPLE_RATE as f64 * total_duration) as usize;
    let mut signal = vec![0.0_f64; sample_count];
    let chars: Vec<char> = text.chars().collect();
    let char_count = chars.len().max(1);

    for t_index in 0..sample_count {
        let t = t_index as f64 / SAMPLE_RATE as f64;
        let mut sample = 0.0;
        for (index, &c) in chars.iter().enumerate() {
            let freq = tone_for_char(c, voice.base_frequency);
            if freq == 0.0 {
                continue;
            }
            let phase = index as f64 / char_count as f64;
            sample += (2.0 * PI * freq * t + phase).sin();
        }
        signal[t_index] = sample;
    }

    apply_triangular_envelope(&mut signal);
    normalize(&mut signal);
    encode_wav(
        &signal.iter().map(|s| *s as f32).collect::<Vec<_>>(),
        SAMPLE_RATE,
    )
}

fn apply_triangular_envelope(signal: &mut [f64]) {
    let len = signal.len();
    if len == 0 {
        return;
    }
    for (index, sample) in signal.iter_mut().enumerate() {
        let rising = index as f64 / (len - 1).max(1) as f64;
        let falling = (len - 1 - index) as f64 / (len - 1).max(1) as f64;
        *sample *= rising.min(falling);
    }
}

fn normalize(signal: &mut [f64]) {
    let peak = signal.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let divisor = if peak == 0.0 { 1.0 } else { peak };
    for sample in signal.iter_mut() {
        *sample /= divisor;
    }
}

fn synth_effect(description: &str, duration: f64) -> Vec<u8> {
    let sample_count = (SAMPLE_RATE as f64 * duration) as usize;
    let mut signal = vec![0.0_f64; sample_count];
    let lower = description.to_lowercase();
    let mut matched = false;

    let mut apply = |generator: &dyn Fn(usize) -> f64| {
        for (index, sample) in signal.iter_mut().enumerate() {
            *sample += generator(index);
        }
    };

    if lower.contains("rain") {
        let mut rng = StdRng::seed_from_u64(123);
        apply(&|_| rng_normal(&mut rng, 0.0, 0.2));
        matched = true;
    }
    if lower.contains("ocean") {
        apply(&|index| {
            let t = index as f64 / SAMPLE_RATE as f64;
            (2.0 * PI * 80.0 * t).sin() * 0.4
        });
        matched = true;
    }
    if lower.contains("wind") {
        let mut rng = StdRng::seed_from_u64(321);
        let mut cumulative = 0.0;
        apply(&|_| {
            cumulative += rng_normal(&mut rng, 0.0, 0.15);
            cumulative
        });
        matched = true;
    }
    if lower.contains("beep") {
        apply(&|index| {
            let t = index as f64 / SAMPLE_RATE as f64;
            (2.0 * PI * 880.0 * t).sin()
        });
        matched = true;
    }
    if lower.contains("rumble") {
        apply(&|index| {
            let t = index as f64 / SAMPLE_RATE as f64;
            (2.0 * PI * 45.0 * t).sin() * 0.6
        });
        matched = true;
    }

    if !matched {
        let digest = sha1::Sha1::digest(description.as_bytes());
        let seed = u64::from_be_bytes(digest[0..8].try_into().unwrap());
        let mut rng = StdRng::seed_from_u64(seed);
        apply(&|_| rng_normal(&mut rng, 0.0, 0.25));
    }

    normalize(&mut signal);
    encode_wav(
        &signal.iter().map(|s| *s as f32).collect::<Vec<_>>(),
        SAMPLE_RATE,
    )
}

/// Box-Muller transform; the pack carries no distribution helper for `rand`'s plain RNG.
fn rng_normal(rng: &mut StdRng, mean: f64, std_dev: f64) -> f64 {
    let u1: f64 = rng.gen_range(1e-12..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    mean + std_dev * (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

pub struct GenerateImageTool;

#[async_trait]
impl Tool for GenerateImageTool {
    fn name(&self) -> &str {
        TOOL_GENERATE_IMAGE
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_GENERATE_IMAGE.to_string(),
            description: Some(
                "Synthesises a deterministic coloured-card image from a text prompt.".to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {"prompt": {"type": "string"}},
                "required": ["prompt"]
            }),
        }
    }

    async fn call(&self, args: Value, _ctx: &ToolContext) -> ToolResult {
        let prompt = match args
            .get("prompt")
            .or_else(|| args.get("description"))
            .and_then(|v| v.as_str())
        {
            Some(p) if !p.is_empty() => p,
            _ => return ToolResult::failure("'prompt' is required"),
        };
        let png = image_from_prompt(prompt);
        ToolResult {
            success: true,
            output: Some("Generated synthetic image".to_string()),
            data: Some(json!({
                "base64": BASE64.encode(png),
                "mime": "image/png",
                "prompt": prompt,
            })),
            error: None,
        }
    }
}

pub struct GetAvailableVoicesTool;

#[async_trait]
impl Tool for GetAvailableVoicesTool {
    fn name(&self) -> &str {
        TOOL_GET_AVAILABLE_VOICES
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_GET_AVAILABLE_VOICES.to_string(),
            description: Some("Lists the available synthetic voices.".to_string()),
            input_schema: json!({"type": "object", "properties": {}}),
        }
    }

    async fn call(&self, _args: Value, _ctx: &ToolContext) -> ToolResult {
        let voices: Vec<Value> = VOICES.iter().copied().map(serialize_voice).collect();
        ToolResult {
            success: true,
            output: Some(format!("Found {} voices", voices.len())),
            data: Some(json!({"voices": voices})),
            error: None,
        }
    }
}

pub struct GenerateSpeechTool;

#[async_trait]
impl Tool for GenerateSpeechTool {
    fn name(&self) -> &str {
        TOOL_GENERATE_SPEECH
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_GENERATE_SPEECH.to_string(),
            description: Some(
                "Synthesises spoken audio for text in a chosen voice.".to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "text": {"type": "string"},
                    "voice_id": {"type": "string"}
                },
                "required": ["text", "voice_id"]
            }),
        }
    }

    async fn call(&self, args: Value, _ctx: &ToolContext) -> ToolResult {
        let text = match args
            .get("text")
            .or_else(|| args.get("content"))
            .and_then(|v| v.as_str())
        {
            Some(t) if !t.is_empty() => t,
            _ => return ToolResult::failure("'text' is required"),
        };
        let voice_id = match args
            .get("voice_id")
            .or_else(|| args.get("voice"))
            .and_then(|v| v.as_str())
        {
            Some(v) if !v.is_empty() => v,
            _ => return ToolResult::failure("'voice_id' is required"),
        };
        let Some(voice) = find_voice(voice_id) else {
            return ToolResult::failure(format!("Unknown voice_id '{voice_id}'"));
        };

        let audio = synth_speech(text, voice);
        ToolResult {
            success: true,
            output: Some("Generated speech audio".to_string()),
            data: Some(json!({
                "base64": BASE64.encode(audio),
                "mime": "audio/wav",
                "voice": serialize_voice(voice),
            })),
            error: None,
        }
    }
}

pub struct GenerateSoundEffectsTool;

#[async_trait]
impl Tool for GenerateSoundEffectsTool {
    fn name(&self) -> &str {
        TOOL_GENERATE_SOUND_EFFECTS
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_GENERATE_SOUND_EFFECTS.to_string(),
            description: Some(
                "Synthesises a short sound effect (0.5-22s) from a description.".to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "description": {"type": "string"},
                    "duration": {"type": "number"}
                },
                "required": ["description"]
            }),
        }
    }

    async fn call(&self, args: Value, _ctx: &ToolContext) -> ToolResult {
        let description = match args
            .get("description")
            .or_else(|| args.get("prompt"))
            .and_then(|v| v.as_str())
        {
            Some(d) if !d.is_empty() => d,
            _ => return ToolResult::failure("'description' is required"),
        };
        let duration = args
            .get("duration")
            .and_then(|v| v.as_f64())
            .unwrap_or(3.0);
        if !(0.5..=22.0).contains(&duration) {
            return ToolResult::failure("duration must be between 0.5 and 22 seconds");
        }

        let audio = synth_effect(description, duration);
        ToolResult {
            success: true,
            output: Some("Generated synthetic sound effect".to_string()),
            data: Some(json!({
                "base64": BASE64.encode(audio),
                "mime": "audio/wav",
                "duration": duration,
            })),
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SessionToolState;
    use okcvm_workspace::{WorkspaceManager, WorkspaceManagerConfig};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn ctx() -> (tempfile::TempDir, ToolContext) {
        let dir = tempdir().unwrap();
        let manager = WorkspaceManager::new(WorkspaceManagerConfig {
            base_dir: dir.path().to_path_buf(),
            mount_root: "/mnt".to_string(),
            snapshots_enabled: false,
            max_reported_snapshots: 20,
        });
        let ws = manager.create_workspace().unwrap();
        (
            dir,
            ToolContext::new(Arc::new(ws), Arc::new(SessionToolState::default())),
        )
    }

    #[tokio::test]
    async fn generate_image_returns_png_base64() {
        let (_dir, ctx) = ctx();
        let tool = GenerateImageTool;
        let result = tool.call(json!({"prompt": "a quiet harbour"}), &ctx).await;
        assert!(result.success);
        let data = result.data.unwrap();
        assert_eq!(data["mime"], "image/png");
        let decoded = BASE64.decode(data["base64"].as_str().unwrap()).unwrap();
        assert_eq!(&decoded[1..4], b"PNG");
    }

    #[tokio::test]
    async fn generate_image_requires_prompt() {
        let (_dir, ctx) = ctx();
        let tool = GenerateImageTool;
        let result = tool.call(json!({}), &ctx).await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn voices_lists_three_entries() {
        let (_dir, ctx) = ctx();
        let tool = GetAvailableVoicesTool;
        let result = tool.call(json!({}), &ctx).await;
        assert_eq!(result.data.unwrap()["voices"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn generate_speech_rejects_unknown_voice() {
        let (_dir, ctx) = ctx();
        let tool = GenerateSpeechTool;
        let result = tool
            .call(json!({"text": "hi", "voice_id": "voice_nope"}), &ctx)
            .await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn generate_speech_produces_wav_header() {
        let (_dir, ctx) = ctx();
        let tool = GenerateSpeechTool;
        let result = tool
            .call(json!({"text": "hello there", "voice_id": "voice_alloy"}), &ctx)
            .await;
        assert!(result.success);
        let data = result.data.unwrap();
        let decoded = BASE64.decode(data["base64"].as_str().unwrap()).unwrap();
        assert_eq!(&decoded[0..4], b"RIFF");
    }

    #[tokio::test]
    async fn sound_effects_rejects_out_of_range_duration() {
        let (_dir, ctx) = ctx();
        let tool = GenerateSoundEffectsTool;
        let result = tool
            .call(json!({"description": "rain", "duration": 40.0}), &ctx)
            .await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn sound_effects_matches_keyword() {
        let (_dir, ctx) = ctx();
        let tool = GenerateSoundEffectsTool;
        let result = tool
            .call(json!({"description": "gentle rain on a roof"}), &ctx)
            .await;
        assert!(result.success);
        assert_eq!(result.data.unwrap()["duration"], 3.0);
    }
}
