//! Profile pictures derived from a user's emoji: a radial-gradient disc
//! coloured from the glyph's code point, cached on disk per glyph and user.

use image::{Rgba, RgbaImage};
use std::path::PathBuf;
use tracing::info;

const AVATAR_SIZE: u32 = 128;
const URL_PREFIX: &str = "/emoji";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Avatar {
    pub file: String,
    pub url: String,
    pub cached: bool,
}

#[derive(Clone, Debug)]
pub struct AvatarRenderer {
    dir: PathBuf,
}

impl AvatarRenderer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// On-disk path of a previously rendered avatar. Anything that is not a
    /// plain `.png` file name is refused.
    pub fn image_path(&self, file: &str) -> Option<PathBuf> {
        let plain = file.ends_with(".png")
            && !file.starts_with('.')
            && !file.contains(['/', '\\'])
            && !file.contains("..");
        plain.then(|| self.dir.join(file))
    }

    /// Returns the avatar for `emoji` and `user_id`, rendering it on first
    /// request.
    pub fn avatar_for(&self, emoji: &str, user_id: &str) -> Result<Avatar, String> {
        let code = emoji
            .chars()
            .next()
            .map(u32::from)
            .ok_or_else(|| "emoji is empty".to_string())?;
        let user_prefix: String = user_id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .take(8)
            .collect();
        let file = format!("{code:x}-{user_prefix}.png");
        let url = format!("{URL_PREFIX}/{file}");
        let path = self.dir.join(&file);
        if path.exists() {
            return Ok(Avatar {
                file,
                url,
                cached: true,
            });
        }

        std::fs::create_dir_all(&self.dir)
            .map_err(|e| format!("Failed to create avatar directory: {e}"))?;
        render(code)
            .save(&path)
            .map_err(|e| format!("Failed to save avatar: {e}"))?;
        info!(file = %file, "rendered emoji avatar");
        Ok(Avatar {
            file,
            url,
            cached: false,
        })
    }
}

fn render(code: u32) -> RgbaImage {
    let hue1 = (code as f32 * 137.5) % 360.0;
    let hue2 = (hue1 + 60.0) % 360.0;
    let inner = hsl(hue1, 0.75, 0.80);
    let middle = hsl(hue2, 0.65, 0.70);
    let outer = hsl(hue1, 0.70, 0.55);
    let border = hsl(hue1, 0.60, 0.45);

    let size = AVATAR_SIZE as f32;
    let center = size / 2.0;
    let radius = size / 2.0;
    let highlight_center = size / 3.0;
    let highlight_radius = size / 4.0;

    let mut img = RgbaImage::new(AVATAR_SIZE, AVATAR_SIZE);
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);
        let dist = ((px - center).powi(2) + (py - center).powi(2)).sqrt();
        if dist > radius {
            *pixel = Rgba([0, 0, 0, 0]);
            continue;
        }
        let t = dist / radius;
        let mut color = if t < 0.6 {
            mix(inner, middle, t / 0.6)
        } else {
            mix(middle, outer, (t - 0.6) / 0.4)
        };
        if dist > radius - 3.0 {
            color = border;
        }
        let hd = ((px - highlight_center).powi(2) + (py - highlight_center).powi(2)).sqrt();
        if hd < highlight_radius {
            color = mix(color, [255, 255, 255], 0.4 * (1.0 - hd / highlight_radius));
        }
        *pixel = Rgba([color[0], color[1], color[2], 255]);
    }
    img
}

fn mix(a: [u8; 3], b: [u8; 3], t: f32) -> [u8; 3] {
    let t = t.clamp(0.0, 1.0);
    let lerp = |x: u8, y: u8| (x as f32 + (y as f32 - x as f32) * t).round() as u8;
    [lerp(a[0], b[0]), lerp(a[1], b[1]), lerp(a[2], b[2])]
}

fn hsl(h: f32, s: f32, l: f32) -> [u8; 3] {
    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let hp = h / 60.0;
    let x = c * (1.0 - (hp % 2.0 - 1.0).abs());
    let (r, g, b) = match hp as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = l - c / 2.0;
    let to_u8 = |v: f32| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    [to_u8(r), to_u8(g), to_u8(b)]
}
