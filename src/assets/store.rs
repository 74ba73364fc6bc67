use std::collections::{HashMap, HashSet};

use futures::future::try_join_all;
use tokio::time::Instant;

#[allow(unused_imports)]
use log::{debug, info, warn, error};

use crate::assets::bundle::{Bundle, BundleOptions, BundleState};
use crate::config::Limits;
use crate::error::{AtlasError, Result};
use crate::textures::backend::TextureBackend;
use crate::textures::cropping::process_image;
use crate::textures::layer::Layer;
use crate::textures::packer::pack_images;
use crate::textures::prebaked::load_prebaked;
use crate::textures::source::{load_images, TextureSource};
use crate::textures::store::AtlasCoordinateStore;
use crate::textures::types::{AtlasCoords, AtlasUsage, CpuTextureAtlas, Size, TextureId, Vec2};
use crate::utils::timing::{ScopedTimer, StageTimings};

/// Owns every bundle, the coordinate store and the atlas layers of one engine instance.
///
/// Loading a bundle fetches its sources, crops or tiles them on the backend, packs
/// the results into fresh layers and uploads them. Unloading drops the bundle's
/// references; a texture leaves the store when no loaded bundle holds it, and a
/// layer returns to the free list when its last texture is gone.
#[derive(Debug)]
pub struct AssetStore<B: TextureBackend> {
    backend: B,
    limits: Limits,
    bundles: HashMap<String, Bundle>,
    store: AtlasCoordinateStore,
    layers: Vec<Layer>,
    owners: HashMap<TextureId, HashSet<String>>,
    timings: StageTimings,
}

impl<B: TextureBackend> AssetStore<B> {
    /// Fails with `AtlasError::Settings` when either limit is zero.
    pub fn new(backend: B, limits: Limits) -> Result<Self> {
        limits.validate()?;
        info!(
            "Creating asset store: {} layers of {}x{}",
            limits.texture_array_layers, limits.texture_size, limits.texture_size
        );
        Ok(Self {
            backend,
            limits,
            bundles: HashMap::new(),
            store: AtlasCoordinateStore::new(),
            layers: vec![Layer::Empty; limits.texture_array_layers as usize],
            owners: HashMap::new(),
            timings: StageTimings::default(),
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    pub fn timings(&self) -> &StageTimings {
        &self.timings
    }

    pub fn bundle(&self, name: &str) -> Option<&Bundle> {
        self.bundles.get(name)
    }

    /// Records a bundle. With `auto_load` it is loaded before this returns.
    ///
    /// Path sources are read with `tokio::fs`, so loading them needs a Tokio runtime.
    pub async fn register_bundle(&mut self, name: &str, options: BundleOptions) -> Result<()> {
        if self.bundles.contains_key(name) {
            return Err(AtlasError::DuplicateBundle(name.to_string()));
        }

        let auto_load = options.auto_load;
        debug!(
            "Registering bundle '{}' ({} textures, {} prebaked atlases)",
            name,
            options.textures.len(),
            options.atlases.len()
        );
        self.bundles.insert(name.to_string(), Bundle::new(name, options));

        if auto_load {
            self.load_bundle(name).await?;
        }
        Ok(())
    }

    /// Loads (or reloads) a registered bundle. On failure nothing is stored and
    /// the bundle keeps a non-loaded state.
    ///
    /// Must run inside a Tokio runtime when the bundle has path sources.
    pub async fn load_bundle(&mut self, name: &str) -> Result<()> {
        let bundle = self
            .bundles
            .get(name)
            .ok_or_else(|| AtlasError::UnknownBundle(name.to_string()))?;
        let options = bundle.options.clone();
        let mut previous = bundle.state;

        if previous == BundleState::Loaded {
            debug!("Reloading bundle '{}'", name);
            self.unload_bundle(name)?;
            previous = BundleState::Unloaded;
        }

        self.set_state(name, BundleState::Loading);
        let start = Instant::now();

        match self.load_contents(name, &options).await {
            Ok(resident) => {
                info!("Loaded bundle '{}' ({} textures) in {:?}", name, resident.len(), start.elapsed());
                if let Some(bundle) = self.bundles.get_mut(name) {
                    bundle.state = BundleState::Loaded;
                    bundle.resident = resident;
                }
                Ok(())
            }
            Err(err) => {
                error!("Failed to load bundle '{}': {}", name, err);
                self.set_state(name, previous);
                Err(err)
            }
        }
    }

    /// Releases the bundle's textures. Unloading a bundle that is not loaded is a no-op.
    pub fn unload_bundle(&mut self, name: &str) -> Result<()> {
        let bundle = self
            .bundles
            .get_mut(name)
            .ok_or_else(|| AtlasError::UnknownBundle(name.to_string()))?;

        if bundle.state != BundleState::Loaded {
            debug!("Bundle '{}' is {:?}, nothing to unload", name, bundle.state);
            return Ok(());
        }

        bundle.state = BundleState::Unloaded;
        let resident = std::mem::take(&mut bundle.resident);

        let used_before = self.store.used_pixels();
        for id in &resident {
            self.release_texture(id, name);
        }
        info!(
            "Unloaded bundle '{}', freed {} texels",
            name,
            used_before - self.store.used_pixels()
        );
        Ok(())
    }

    /// Loads a single texture as a bundle named after it, replacing that bundle's source.
    ///
    /// While another loaded bundle holds `id`, the resident texture is shared and
    /// the new source is not used.
    pub async fn load_texture(
        &mut self,
        id: &str,
        source: impl Into<TextureSource>,
        crop_transparent_pixels: bool,
    ) -> Result<()> {
        let mut holders: Vec<&String> = self
            .owners
            .get(id)
            .map(|owners| owners.iter().filter(|owner| owner.as_str() != id).collect())
            .unwrap_or_default();
        if !holders.is_empty() {
            holders.sort();
            warn!(
                "'{}' is held by bundle(s) {:?}, keeping the resident texture and ignoring the new source",
                id, holders
            );
        }

        let options = BundleOptions::new()
            .texture(id, source)
            .crop_transparent_pixels(crop_transparent_pixels);

        match self.bundles.get_mut(id) {
            // Takes effect through the reload in load_bundle.
            Some(bundle) => bundle.options = options,
            None => {
                self.bundles.insert(id.to_string(), Bundle::new(id, options));
            }
        }
        self.load_bundle(id).await
    }

    pub fn get_size(&self, id: &str) -> Result<Size<u32>> {
        self.store.size(id)
    }

    pub fn get_atlas_coords(&self, id: &str) -> Result<&[AtlasCoords]> {
        self.store.get(id)
    }

    pub fn get_texture_offset(&self, id: &str) -> Result<Vec2> {
        self.store.draw_offset(id)
    }

    pub fn get_atlas_usage(&self) -> AtlasUsage {
        self.store.usage(
            self.limits.texture_size,
            self.layers_in_use(),
            self.limits.texture_array_layers,
        )
    }

    /// Checks a draw-time reference before the draw is queued.
    pub fn validate_texture_reference(&self, id: &str) -> Result<()> {
        if self.store.contains(id) {
            Ok(())
        } else {
            Err(AtlasError::UnregisteredTextureDraw(id.to_string()))
        }
    }

    /// Resident texture ids, sorted.
    pub fn texture_ids(&self) -> Vec<TextureId> {
        let mut ids: Vec<TextureId> = self.store.ids().cloned().collect();
        ids.sort();
        ids
    }

    pub fn is_bundle_loaded(&self, name: &str) -> bool {
        self.bundles.get(name).is_some_and(Bundle::is_loaded)
    }

    pub fn bundle_state(&self, name: &str) -> Option<BundleState> {
        self.bundles.get(name).map(|bundle| bundle.state)
    }

    pub fn max_pixels(&self) -> u64 {
        self.limits.max_pixels()
    }

    pub fn layers_in_use(&self) -> u32 {
        self.layers.iter().filter(|layer| !layer.is_empty()).count() as u32
    }

    /// Releases every layer and forgets all bundles and textures.
    pub fn destroy(&mut self) {
        for (index, layer) in self.layers.iter_mut().enumerate() {
            if !layer.is_empty() {
                self.backend.release_layer(index as u32);
                *layer = Layer::Empty;
            }
        }
        self.store.clear();
        self.owners.clear();
        self.bundles.clear();
        self.timings.log_summary();
        info!("Asset store destroyed");
    }

    fn set_state(&mut self, name: &str, state: BundleState) {
        if let Some(bundle) = self.bundles.get_mut(name) {
            bundle.state = state;
        }
    }

    fn free_layers(&self) -> Vec<u32> {
        self.layers
            .iter()
            .enumerate()
            .filter(|(_, layer)| layer.is_empty())
            .map(|(index, _)| index as u32)
            .collect()
    }

    /// Drops `owner`'s reference on `id`, and the texture itself once unreferenced.
    fn release_texture(&mut self, id: &TextureId, owner: &str) {
        if let Some(owners) = self.owners.get_mut(id) {
            owners.remove(owner);
            if !owners.is_empty() {
                debug!("'{}' is still held by {:?}", id, owners);
                return;
            }
        }
        self.owners.remove(id);

        let Some(entry) = self.store.remove(id) else {
            return;
        };

        let mut per_layer: HashMap<u32, u64> = HashMap::new();
        for coords in &entry.coords {
            *per_layer.entry(coords.atlas_index).or_default() += coords.texel_area();
        }

        for (index, pixels) in per_layer {
            if let Some(layer) = self.layers.get_mut(index as usize) {
                if layer.release(id, pixels) {
                    debug!("Atlas layer {} is free", index);
                    self.backend.release_layer(index);
                }
            }
        }
    }

    /// Stages every layer of the bundle, uploads them, then commits coordinates.
    /// Returns the ids the bundle now holds.
    async fn load_contents(&mut self, name: &str, options: &BundleOptions) -> Result<Vec<TextureId>> {
        let size = self.limits.texture_size;
        let mut resident = Vec::new();
        let mut seen = HashSet::new();

        let mut pending = Vec::new();
        for (id, source) in &options.textures {
            if !seen.insert(id.clone()) {
                warn!("Bundle '{}' lists '{}' more than once", name, id);
                continue;
            }
            resident.push(id.clone());
            if self.store.contains(id) {
                debug!("'{}' is already resident, sharing it", id);
                continue;
            }
            pending.push((id.clone(), source.clone()));
        }

        let mut staged: Vec<CpuTextureAtlas> = Vec::new();
        for (i, atlas) in options.atlases.iter().enumerate() {
            let label = format!("{name}[{i}]");
            let mut layer = load_prebaked(atlas, &label, size).await?;
            layer.texture_regions.retain(|id, _| {
                if !seen.insert(id.clone()) {
                    return false;
                }
                resident.push(id.clone());
                !self.store.contains(id)
            });
            if layer.texture_regions.is_empty() {
                debug!("Prebaked atlas {} adds no new textures, skipping upload", label);
                continue;
            }
            staged.push(layer);
        }

        let start = Instant::now();
        let images = load_images(&pending).await?;
        let crop = options.crop_transparent_pixels;
        let backend = &self.backend;
        let processed = try_join_all(pending.iter().zip(images).map(|((id, _), image)| {
            let frame = Size::new(image.width(), image.height());
            async move {
                process_image(backend, id, image, crop, size)
                    .await
                    .map(|tiles| (frame, tiles))
            }
        }))
        .await?;
        self.timings.process.add_measurement(start.elapsed());

        let mut sizes = HashMap::new();
        let mut items = Vec::new();
        for ((id, _), (frame, tiles)) in pending.iter().zip(processed) {
            sizes.insert(id.clone(), frame);
            items.extend(tiles.into_iter().map(|tile| (id.clone(), tile)));
        }

        let free = self.free_layers();
        let max = self.limits.texture_array_layers;
        if staged.len() > free.len() {
            return Err(AtlasError::AtlasCapacityExceeded {
                needed: staged.len(),
                free: free.len(),
                max,
            });
        }

        if !items.is_empty() {
            let prebaked = staged.len();
            let packed = {
                let _timer = ScopedTimer::new(&mut self.timings.pack);
                pack_images(&items, size, free.len() - prebaked, max)
            };
            let packed = packed.map_err(|err| match err {
                AtlasError::AtlasCapacityExceeded { needed, .. } => AtlasError::AtlasCapacityExceeded {
                    needed: needed + prebaked,
                    free: free.len(),
                    max,
                },
                other => other,
            })?;
            staged.extend(packed.atlases);
        }

        let targets = &free[..staged.len()];
        {
            let _timer = ScopedTimer::new(&mut self.timings.upload);
            for (written, (&index, atlas)) in targets.iter().zip(&staged).enumerate() {
                if let Err(err) = self.backend.write_layer(index, atlas) {
                    for &index in &targets[..written] {
                        self.backend.release_layer(index);
                    }
                    return Err(err);
                }
            }
        }

        // Layers are visited in order, so tiles stay in tile order.
        let mut coords: HashMap<TextureId, Vec<AtlasCoords>> = HashMap::new();
        for (&atlas_index, atlas) in targets.iter().zip(&staged) {
            for (id, regions) in &atlas.texture_regions {
                if let Some(first) = regions.first() {
                    sizes.entry(id.clone()).or_insert(first.original_size);
                }
                coords
                    .entry(id.clone())
                    .or_default()
                    .extend(regions.iter().map(|region| AtlasCoords {
                        region: *region,
                        atlas_index,
                    }));
            }
            self.layers[atlas_index as usize] =
                Layer::busy(atlas.texture_regions.keys().cloned(), atlas.used_pixels());
        }

        for (id, coords) in coords {
            let size = sizes.get(&id).copied().unwrap_or_default();
            self.store.set(id, coords, size);
        }
        for id in &resident {
            self.owners.entry(id.clone()).or_default().insert(name.to_string());
        }

        debug!("Bundle '{}' uploaded into layers {:?}", name, targets);
        Ok(resident)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CHECKER_COLOR_OFF, CHECKER_COLOR_ON};
    use crate::textures::cpu_backend::CpuBackend;
    use crate::textures::prebaked::PrebakedAtlas;
    use crate::textures::types::TexelRect;
    use futures::executor::block_on;
    use image::{Rgba, RgbaImage};
    use std::path::PathBuf;

    fn store(size: u32, layers: u32) -> AssetStore<CpuBackend> {
        AssetStore::new(CpuBackend::new(), Limits::new(size, layers)).unwrap()
    }

    fn opaque(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba([90, 160, 30, 255]))
    }

    fn load(store: &mut AssetStore<CpuBackend>, name: &str, options: BundleOptions) -> Result<()> {
        block_on(store.register_bundle(name, options.auto_load(true)))
    }

    #[test]
    fn test_opaque_texture_in_large_layer() {
        let mut store = store(1024, 4);
        load(&mut store, "ui", BundleOptions::new().texture("button", opaque(64, 64)).crop_transparent_pixels(true)).unwrap();

        let coords = store.get_atlas_coords("button").unwrap();
        assert_eq!(coords.len(), 1);
        assert_eq!(coords[0].atlas_index, 0);
        assert_eq!(coords[0].uv_scale.width, 64.0 / 1024.0);
        assert_eq!(coords[0].uv_scale.height, 64.0 / 1024.0);
        assert_eq!(store.get_texture_offset("button").unwrap(), Vec2::new(0.0, 0.0));
        assert_eq!(store.get_size("button").unwrap(), Size::new(64, 64));

        let layer = store.backend().layer(0).unwrap();
        let x = (coords[0].uv_offset.x * 1024.0) as u32;
        let y = (coords[0].uv_offset.y * 1024.0) as u32;
        assert_eq!(layer.get_pixel(x + 63, y + 63)[3], 255);
    }

    #[test]
    fn test_transparent_texture_becomes_checkerboard() {
        let mut store = store(256, 2);
        load(&mut store, "broken", BundleOptions::new().texture("ghost", RgbaImage::new(30, 20)).crop_transparent_pixels(true)).unwrap();

        let coords = store.get_atlas_coords("ghost").unwrap();
        assert_eq!(coords[0].original_size, Size::new(30, 20));
        assert_eq!(coords[0].cropped_size, Size::new(30, 20));

        let layer = store.backend().layer(0).unwrap();
        let x = (coords[0].uv_offset.x * 256.0) as u32;
        let y = (coords[0].uv_offset.y * 256.0) as u32;
        assert_eq!(layer.get_pixel(x, y), &Rgba(CHECKER_COLOR_ON));
        assert_eq!(layer.get_pixel(x + 25, y), &Rgba(CHECKER_COLOR_OFF));
    }

    #[test]
    fn test_single_pixel_crops_to_one_texel() {
        let mut image = RgbaImage::new(10, 6);
        image.put_pixel(2, 1, Rgba([255, 255, 255, 255]));

        let mut store = store(64, 2);
        load(&mut store, "dots", BundleOptions::new().texture("dot", image).crop_transparent_pixels(true)).unwrap();

        let coords = store.get_atlas_coords("dot").unwrap();
        assert_eq!(coords[0].cropped_size, Size::new(1, 1));
        assert_eq!(coords[0].original_size, Size::new(10, 6));
        // (x - (width - x - 1), (height - y - 1) - y)
        assert_eq!(store.get_texture_offset("dot").unwrap(), Vec2::new(-5.0, 3.0));
    }

    #[test]
    fn test_packed_textures_never_overlap_and_stay_in_their_layer() {
        let mut options = BundleOptions::new();
        for i in 0..40u32 {
            let width = i * 37 % 50 + 5;
            let height = i * 53 % 40 + 3;
            options = options.texture(format!("t{i}"), opaque(width, height));
        }

        let mut store = store(128, 16);
        load(&mut store, "many", options).unwrap();

        let mut placed: Vec<(u32, TexelRect)> = Vec::new();
        for id in store.texture_ids() {
            for coords in store.get_atlas_coords(&id).unwrap() {
                let scale = coords.sampled_scale();
                assert!(coords.uv_offset.x + coords.uv_scale.width <= 1.0 + 1e-5);
                assert!(coords.uv_offset.y + coords.uv_scale.height <= 1.0 + 1e-5);
                assert!(coords.uv_offset.x + scale.width <= 1.0 + 1e-5);
                assert!(coords.atlas_index < 16);

                let rect = TexelRect::new(
                    (coords.uv_offset.x * 128.0).round() as u32,
                    (coords.uv_offset.y * 128.0).round() as u32,
                    coords.cropped_size.width,
                    coords.cropped_size.height,
                );
                for (layer, other) in &placed {
                    assert!(*layer != coords.atlas_index || !rect.intersects(other), "{id} overlaps");
                }
                placed.push((coords.atlas_index, rect));
            }
        }
        assert_eq!(placed.len(), 40);
    }

    #[test]
    fn test_unload_removes_ids_and_frees_usage() {
        let mut store = store(256, 4);
        load(&mut store, "a", BundleOptions::new().texture("big", opaque(64, 64))).unwrap();
        load(&mut store, "b", BundleOptions::new().texture("small", opaque(32, 32))).unwrap();

        let before = store.get_atlas_usage();
        assert_eq!(before.used, 64 * 64 + 32 * 32);
        assert_eq!(before.layers_in_use, 2);
        assert_eq!(before.available, 2 * 256 * 256 - before.used);

        store.unload_bundle("b").unwrap();
        let after = store.get_atlas_usage();
        assert_eq!(before.used - after.used, 32 * 32);
        assert_eq!(after.layers_in_use, 1);
        assert_eq!(store.bundle_state("b"), Some(BundleState::Unloaded));
        assert!(matches!(store.get_atlas_coords("small"), Err(AtlasError::InvalidBundleReference(_))));
        assert!(matches!(store.get_size("small"), Err(AtlasError::InvalidBundleReference(_))));
        assert_eq!(store.backend().resident_layers(), 1);
    }

    #[test]
    fn test_reload_restores_coordinates() {
        let mut store = store(128, 2);
        load(&mut store, "level", BundleOptions::new().texture("tree", opaque(20, 40)).texture("rock", opaque(16, 16))).unwrap();
        store.unload_bundle("level").unwrap();
        assert!(store.texture_ids().is_empty());

        block_on(store.load_bundle("level")).unwrap();
        assert!(store.is_bundle_loaded("level"));
        assert_eq!(store.texture_ids(), vec![TextureId::new("rock"), TextureId::new("tree")]);
        assert_eq!(store.get_size("tree").unwrap(), Size::new(20, 40));

        // Reloading a loaded bundle does not double count it.
        let used = store.get_atlas_usage().used;
        block_on(store.load_bundle("level")).unwrap();
        assert_eq!(store.get_atlas_usage().used, used);
        assert_eq!(store.layers_in_use(), 1);
    }

    #[test]
    fn test_freed_layers_are_reused_lowest_first() {
        let mut store = store(64, 4);
        load(&mut store, "a", BundleOptions::new().texture("a", opaque(10, 10))).unwrap();
        load(&mut store, "b", BundleOptions::new().texture("b", opaque(10, 10))).unwrap();
        assert_eq!(store.get_atlas_coords("b").unwrap()[0].atlas_index, 1);

        store.unload_bundle("a").unwrap();
        load(&mut store, "c", BundleOptions::new().texture("c", opaque(10, 10))).unwrap();
        assert_eq!(store.get_atlas_coords("c").unwrap()[0].atlas_index, 0);
    }

    #[test]
    fn test_capacity_exceeded_leaves_store_untouched() {
        let mut store = store(64, 1);
        let options = BundleOptions::new().texture("one", opaque(64, 64)).texture("two", opaque(64, 64));
        let err = load(&mut store, "full", options).unwrap_err();

        assert!(matches!(err, AtlasError::AtlasCapacityExceeded { needed: 2, free: 1, max: 1 }));
        assert_eq!(store.bundle_state("full"), Some(BundleState::Registered));
        assert!(store.texture_ids().is_empty());
        assert_eq!(store.backend().resident_layers(), 0);
        assert_eq!(store.layers_in_use(), 0);
    }

    #[tokio::test]
    async fn test_missing_source_fails_the_whole_bundle() {
        let mut store = store(64, 2);
        let options = BundleOptions::new()
            .texture("fine", opaque(4, 4))
            .texture("gone", PathBuf::from("/no/such/texture.png"))
            .auto_load(true);
        let err = store.register_bundle("mixed", options).await.unwrap_err();

        assert!(matches!(err, AtlasError::MissingSourceImage { ref id, .. } if id == "gone"));
        assert!(!store.is_bundle_loaded("mixed"));
        assert!(store.get_atlas_coords("fine").is_err());
    }

    #[test]
    fn test_shared_textures_survive_until_last_owner_unloads() {
        let mut store = store(128, 4);
        load(&mut store, "a", BundleOptions::new().texture("x", opaque(8, 8)).texture("y", opaque(8, 8))).unwrap();
        load(&mut store, "b", BundleOptions::new().texture("y", opaque(8, 8)).texture("z", opaque(8, 8))).unwrap();
        assert_eq!(store.get_atlas_usage().used, 3 * 64);

        store.unload_bundle("a").unwrap();
        assert!(store.get_atlas_coords("x").is_err());
        assert!(store.get_atlas_coords("y").is_ok());
        assert!(store.get_atlas_coords("z").is_ok());

        store.unload_bundle("b").unwrap();
        assert!(store.texture_ids().is_empty());
        assert_eq!(store.get_atlas_usage(), AtlasUsage { max_layers: 4, ..Default::default() });
    }

    #[test]
    fn test_oversized_texture_is_tiled() {
        let mut store = store(64, 8);
        load(&mut store, "jumbo", BundleOptions::new().texture("backdrop", opaque(150, 40))).unwrap();

        let coords = store.get_atlas_coords("backdrop").unwrap();
        assert_eq!(coords.len(), 3);
        let widths: u32 = coords.iter().map(|c| c.original_size.width).sum();
        assert_eq!(widths, 150);
        let offsets: Vec<u32> = coords.iter().map(|c| c.tile_offset.x).collect();
        assert_eq!(offsets, [0, 64, 128]);
        assert_eq!(store.get_size("backdrop").unwrap(), Size::new(150, 40));
        for c in coords {
            assert!(c.uv_offset.x + c.uv_scale.width <= 1.0);
        }
    }

    #[test]
    fn test_prebaked_bundle_is_uploaded_verbatim() {
        let json = r#"{
            "a": {"uvOffset": {"x": 0.0, "y": 0.0}, "uvScale": {"width": 0.5, "height": 0.5},
                  "drawOffset": {"x": 0.0, "y": 0.0}, "originalSize": {"width": 8, "height": 8}},
            "b": {"uvOffset": {"x": 0.5, "y": 0.0}, "uvScale": {"width": 0.25, "height": 0.5},
                  "drawOffset": {"x": 1.0, "y": 0.0}, "originalSize": {"width": 4, "height": 8}}
        }"#;
        let png = opaque(16, 16);
        let mut store = store(16, 2);
        load(&mut store, "baked", BundleOptions::new().atlas(PrebakedAtlas::new(json.as_bytes().to_vec(), png))).unwrap();

        let coords = store.get_atlas_coords("b").unwrap();
        assert_eq!(coords[0].atlas_index, 0);
        assert_eq!(coords[0].uv_offset.x, 0.5);
        assert_eq!(store.get_texture_offset("b").unwrap(), Vec2::new(1.0, 0.0));
        assert_eq!(store.get_size("a").unwrap(), Size::new(8, 8));
        assert_eq!(store.get_atlas_usage().used, 64 + 32);
        assert_eq!(store.backend().layer(0).unwrap().get_pixel(15, 15)[3], 255);
    }

    #[test]
    fn test_bundle_registration_errors() {
        let mut store = store(64, 2);
        block_on(store.register_bundle("menu", BundleOptions::new())).unwrap();
        assert_eq!(store.bundle_state("menu"), Some(BundleState::Registered));
        assert!(matches!(
            block_on(store.register_bundle("menu", BundleOptions::new())),
            Err(AtlasError::DuplicateBundle(_))
        ));
        assert!(matches!(block_on(store.load_bundle("nope")), Err(AtlasError::UnknownBundle(_))));
        assert!(matches!(store.unload_bundle("nope"), Err(AtlasError::UnknownBundle(_))));
        // Not loaded yet, so there is nothing to unload.
        store.unload_bundle("menu").unwrap();
        assert_eq!(store.bundle_state("menu"), Some(BundleState::Registered));
    }

    #[test]
    fn test_draw_references_are_validated() {
        let mut store = store(64, 2);
        assert!(matches!(
            store.validate_texture_reference("hero"),
            Err(AtlasError::UnregisteredTextureDraw(_))
        ));

        block_on(store.load_texture("hero", opaque(12, 12), false)).unwrap();
        store.validate_texture_reference("hero").unwrap();
        assert!(store.is_bundle_loaded("hero"));

        // Loading under the same id swaps the source in.
        block_on(store.load_texture("hero", opaque(20, 10), false)).unwrap();
        assert_eq!(store.get_size("hero").unwrap(), Size::new(20, 10));
        assert_eq!(store.layers_in_use(), 1);
    }

    #[test]
    fn test_destroy_releases_everything() {
        let mut store = store(64, 4);
        load(&mut store, "a", BundleOptions::new().texture("a", opaque(10, 10))).unwrap();
        load(&mut store, "b", BundleOptions::new().texture("b", opaque(10, 10))).unwrap();
        assert_eq!(store.max_pixels(), 4 * 64 * 64);

        store.destroy();
        assert_eq!(store.backend().resident_layers(), 0);
        assert!(store.texture_ids().is_empty());
        assert_eq!(store.bundle_state("a"), None);
        assert_eq!(store.layers_in_use(), 0);
    }

    #[tokio::test]
    async fn test_path_sources_load_inside_a_runtime() {
        let dir = std::env::temp_dir().join(format!("atlasforge-store-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("leaf.png");
        opaque(9, 7).save(&path).unwrap();

        let mut store = store(64, 2);
        store.load_texture("leaf", path, false).await.unwrap();
        assert_eq!(store.get_size("leaf").unwrap(), Size::new(9, 7));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_zero_limits_are_rejected() {
        assert!(matches!(
            AssetStore::new(CpuBackend::new(), Limits::new(0, 4)),
            Err(AtlasError::Settings(_))
        ));
        assert!(matches!(
            AssetStore::new(CpuBackend::new(), Limits::new(64, 0)),
            Err(AtlasError::Settings(_))
        ));
    }

    #[test]
    fn test_replacing_a_shared_texture_keeps_the_resident_one() {
        let mut store = store(64, 4);
        load(&mut store, "hud", BundleOptions::new().texture("hero", opaque(12, 12))).unwrap();

        block_on(store.load_texture("hero", opaque(20, 10), false)).unwrap();
        assert!(store.is_bundle_loaded("hero"));
        assert_eq!(store.get_size("hero").unwrap(), Size::new(12, 12));
        assert_eq!(store.layers_in_use(), 1);

        // Once the other holder is gone, reloading picks up the new source.
        store.unload_bundle("hud").unwrap();
        block_on(store.load_bundle("hero")).unwrap();
        assert_eq!(store.get_size("hero").unwrap(), Size::new(20, 10));
    }

    #[test]
    fn test_cropped_texture_at_layer_edge_samples_inside_the_layer() {
        // A 40x40 image with a 10x10 opaque corner, cropped and placed below a
        // 60x40 block near the bottom edge of the 64 texel layer.
        let mut corner = RgbaImage::new(40, 40);
        for y in 0..10 {
            for x in 0..10 {
                corner.put_pixel(x, y, Rgba([1, 2, 3, 255]));
            }
        }
        let options = BundleOptions::new()
            .crop_transparent_pixels(true)
            .texture("wide", opaque(60, 40))
            .texture("corner", corner);
        let mut store = store(64, 1);
        load(&mut store, "edge", options).unwrap();

        for id in ["wide", "corner"] {
            for coords in store.get_atlas_coords(id).unwrap() {
                let sampled = coords.sampled_scale();
                assert!(coords.uv_offset.x + sampled.width <= 1.0 + 1e-6);
                assert!(coords.uv_offset.y + sampled.height <= 1.0 + 1e-6);
            }
        }
        let corner = &store.get_atlas_coords("corner").unwrap()[0];
        assert_eq!(corner.cropped_size, Size::new(10, 10));
        assert_eq!(corner.uv_scale, Size::new(40.0 / 64.0, 40.0 / 64.0));
        // The uncropped extent is allowed to run past the layer.
        assert_eq!(corner.uv_offset.y, 40.0 / 64.0);
        assert!(corner.uv_offset.y + corner.uv_scale.height > 1.0);
    }
}
