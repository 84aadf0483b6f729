use anyhow::Result;

use super::{VisionProvider, VisionRequest};

/// Offline provider: answers from simple pixel statistics so the chat loop
/// can be exercised without a credential.
pub struct DryrunProvider;

impl VisionProvider for DryrunProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn invoke(&self, request: &VisionRequest<'_>) -> Result<Option<String>> {
        let pixels = request.image.pixels();
        let count = (pixels.width() as f64 * pixels.height() as f64).max(1.0);
        let (mut total_r, mut total_g, mut total_b) = (0f64, 0f64, 0f64);
        for pixel in pixels.pixels() {
            total_r += pixel[0] as f64;
            total_g += pixel[1] as f64;
            total_b += pixel[2] as f64;
        }
        let (r, g, b) = (total_r / count, total_g / count, total_b / count);
        let question = request
            .prompt
            .rsplit_once("User Question:")
            .map(|(_, tail)| tail.trim())
            .unwrap_or(request.prompt.trim());

        Ok(Some(format!(
            "[{}] The {}x{} image is mostly {} ({}). You asked: \"{}\" (temperature {:.1}, top_k {}).",
            request.model,
            pixels.width(),
            pixels.height(),
            color_name(r, g, b),
            rgb_hex(r as u8, g as u8, b as u8),
            question,
            request.params.temperature(),
            request.params.top_k(),
        )))
    }
}

fn rgb_hex(r: u8, g: u8, b: u8) -> String {
    format!("#{r:02X}{g:02X}{b:02X}")
}

fn color_name(r: f64, g: f64, b: f64) -> &'static str {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let brightness = ((r + g + b) / (255.0 * 3.0)).clamp(0.0, 1.0);
    if max - min < 18.0 {
        if brightness > 0.78 {
            return "white";
        }
        if brightness < 0.22 {
            return "black";
        }
        return "gray";
    }
    if max == r {
        if g > r * 0.75 {
            "yellow"
        } else if g > r * 0.4 {
            "orange"
        } else {
            "red"
        }
    } else if max == g {
        "green"
    } else {
        "blue"
    }
}
