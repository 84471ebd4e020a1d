// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Derived-image URL grammar.
//
//   {base}/{crop}/{resize}/{output}/{asset_id}
//
//   crop   : c_crop,x_{x},y_{y},w_{w},h_{h}
//   resize : c_{fit},w_{w}[,h_{h}][,g_{gravity}]
//   output : q_{quality}[,f_{format}]
//
// Absent segments are omitted; the order never changes. Shared links embed
// these strings verbatim, so any change here breaks links already in the wild.

use std::fmt;

/// Integer crop rectangle in source-image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// How a resize fills its target box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fit {
    /// Cover the box exactly, cropping overflow.
    Fill,
    /// Fit inside the box, keeping aspect ratio.
    Fit,
    /// Scale to the given dimensions.
    Scale,
}

impl Fit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fill => "fill",
            Self::Fit => "fit",
            Self::Scale => "scale",
        }
    }
}

/// Anchor kept in view when a fill crops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gravity {
    North,
    Center,
}

impl Gravity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::North => "north",
            Self::Center => "center",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resize {
    pub width: u32,
    pub height: Option<u32>,
    pub fit: Fit,
    pub gravity: Option<Gravity>,
}

impl Resize {
    /// Scale to `width`, height following the aspect ratio.
    pub fn to_width(width: u32) -> Self {
        Self {
            width,
            height: None,
            fit: Fit::Scale,
            gravity: None,
        }
    }

    /// Cover a `width` x `height` box anchored at `gravity`.
    pub fn fill(width: u32, height: u32, gravity: Gravity) -> Self {
        Self {
            width,
            height: Some(height),
            fit: Fit::Fill,
            gravity: Some(gravity),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    Auto,
    AutoGood,
    Fixed(u8),
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::AutoGood => f.write_str("auto:good"),
            Self::Fixed(q) => write!(f, "{}", (*q).clamp(1, 100)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Jpg,
    Png,
    Webp,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
        }
    }
}

/// Everything a derived URL can ask the provider to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransformParams {
    pub crop: Option<CropBox>,
    pub resize: Option<Resize>,
    pub quality: Option<Quality>,
    pub format: Option<Format>,
}

impl TransformParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn crop(mut self, crop: CropBox) -> Self {
        self.crop = Some(crop);
        self
    }

    pub fn resize(mut self, resize: Resize) -> Self {
        self.resize = Some(resize);
        self
    }

    pub fn quality(mut self, quality: Quality) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    /// The path segments in grammar order.
    pub fn segments(&self) -> Vec<String> {
        let mut segments = Vec::with_capacity(3);

        if let Some(c) = self.crop {
            segments.push(format!(
                "c_crop,x_{},y_{},w_{},h_{}",
                c.x, c.y, c.width, c.height
            ));
        }

        if let Some(r) = self.resize {
            let mut segment = format!("c_{},w_{}", r.fit.as_str(), r.width);
            if let Some(h) = r.height {
                segment.push_str(&format!(",h_{h}"));
            }
            if let Some(g) = r.gravity {
                segment.push_str(&format!(",g_{}", g.as_str()));
            }
            segments.push(segment);
        }

        let output: Vec<String> = [
            self.quality.map(|q| format!("q_{q}")),
            self.format.map(|f| format!("f_{}", f.as_str())),
        ]
        .into_iter()
        .flatten()
        .collect();
        if !output.is_empty() {
            segments.push(output.join(","));
        }

        segments
    }
}

/// Join `base`, the transform segments and `asset_id` into a delivery URL.
pub fn render_url(base: &str, asset_id: &str, params: &TransformParams) -> String {
    let mut url = base.trim_end_matches('/').to_string();
    for segment in params.segments() {
        url.push('/');
        url.push_str(&segment);
    }
    url.push('/');
    url.push_str(asset_id.trim_start_matches('/'));
    url
}
