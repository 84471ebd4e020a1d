// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// broadsheet-assets: where page images live once they leave the rasterizer.
//
// The `AssetStore` trait is the seam. `HostedAssetStore` talks to the hosted
// image CDN over HTTPS; `InMemoryAssetStore` backs tests and dry runs.
// Derived URLs are computed locally from `TransformParams` and never touch
// the network.

pub mod hosted;
pub mod memory;
pub mod signing;
pub mod store;
pub mod transform;

pub use hosted::HostedAssetStore;
pub use memory::InMemoryAssetStore;
pub use store::{AssetStore, UploadedAsset, asset_id};
pub use transform::{CropBox, Fit, Format, Gravity, Quality, Resize, TransformParams};
