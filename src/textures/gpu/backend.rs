use std::sync::Arc;

use image::RgbaImage;
use wgpu::util::DeviceExt;

#[allow(unused_imports)]
use log::{debug, info, warn};

use crate::config::{Limits, BYTES_PER_PIXEL, WORKGROUP_SIZE};
use crate::error::{AtlasError, Result};
use crate::textures::backend::TextureBackend;
use crate::textures::gpu::atlas::AtlasTextureArray;
use crate::textures::gpu::context::GpuContext;
use crate::textures::gpu::pipelines::{BoundingBox, CheckArea, TextureComputePipelines};
use crate::textures::gpu::readback::{read_buffer, read_texture, read_texture_layer};
use crate::textures::types::{CpuTextureAtlas, Size, TexelRect};

const BOUNDING_BOX_SIZE: u64 = std::mem::size_of::<BoundingBox>() as u64;

/// A source image uploaded for the compute passes. Destroyed on drop.
#[derive(Debug)]
pub struct GpuSource {
    texture: wgpu::Texture,
    size: Size<u32>,
}

impl Drop for GpuSource {
    fn drop(&mut self) {
        self.texture.destroy();
    }
}

/// Runs the texture passes as compute kernels and owns the atlas texture array.
#[derive(Debug)]
pub struct GpuBackend {
    context: GpuContext,
    pipelines: TextureComputePipelines,
    atlas: AtlasTextureArray,
}

fn workgroups(texels: u32) -> u32 {
    texels.div_ceil(WORKGROUP_SIZE)
}

fn check_area(size: Size<u32>, area: TexelRect) -> Result<()> {
    if area.width == 0 || area.height == 0 || area.right() > size.width || area.bottom() > size.height {
        return Err(AtlasError::gpu(format!(
            "area {:?} is empty or exceeds source {}x{}",
            area, size.width, size.height
        )));
    }
    Ok(())
}

impl GpuBackend {
    pub fn new(context: GpuContext, limits: &Limits) -> Result<Self> {
        limits.validate()?;
        let device_limits = context.limits();
        if limits.texture_size > device_limits.max_texture_dimension_2d {
            return Err(AtlasError::Settings(format!(
                "texture size {} exceeds the device maximum {}",
                limits.texture_size, device_limits.max_texture_dimension_2d
            )));
        }
        if limits.texture_array_layers > device_limits.max_texture_array_layers {
            return Err(AtlasError::Settings(format!(
                "{} array layers exceed the device maximum {}",
                limits.texture_array_layers, device_limits.max_texture_array_layers
            )));
        }

        let pipelines = TextureComputePipelines::new(&context.device);
        let atlas = AtlasTextureArray::new(&context.device, context.backend, limits.texture_size);

        Ok(Self {
            context,
            pipelines,
            atlas,
        })
    }

    pub fn context(&self) -> &GpuContext {
        &self.context
    }

    /// The texture array the renderer binds; layer `i` holds `AtlasCoords::atlas_index == i`.
    pub fn atlas(&self) -> &AtlasTextureArray {
        &self.atlas
    }

    /// Copies atlas layer `index` back to the host.
    pub async fn read_layer(&self, index: u32) -> Result<RgbaImage> {
        read_texture_layer(self.device(), &self.context.queue, self.atlas.texture(), index).await
    }

    fn device(&self) -> &wgpu::Device {
        &self.context.device
    }

    async fn check_errors(&self, pass: &str) -> Result<()> {
        match self.device().pop_error_scope().await {
            Some(error) => Err(AtlasError::gpu(format!("{pass}: {error}"))),
            None => Ok(()),
        }
    }

    fn storage_output(&self, label: &str, size: Size<u32>) -> wgpu::Texture {
        self.device().create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size.width,
                height: size.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        })
    }

    fn dispatch(
        &self,
        label: &str,
        pipeline: &wgpu::ComputePipeline,
        bind_group: &wgpu::BindGroup,
        size: Size<u32>,
        encoder: &mut wgpu::CommandEncoder,
    ) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(label),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(workgroups(size.width), workgroups(size.height), 1);
    }
}

impl TextureBackend for GpuBackend {
    type Source = GpuSource;

    async fn prepare_source(&self, image: &Arc<RgbaImage>) -> Result<GpuSource> {
        let size = Size::new(image.width(), image.height());
        let extent = wgpu::Extent3d {
            width: size.width,
            height: size.height,
            depth_or_array_layers: 1,
        };
        let device = self.device();
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        // GL treats a single-layer texture as a plain 2D texture, which cannot be viewed as an array
        let layers = if self.context.backend == wgpu::Backend::Gl { 2 } else { 1 };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("atlasforge source texture"),
            size: wgpu::Extent3d {
                depth_or_array_layers: layers,
                ..extent
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        self.context.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            image.as_raw(),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(BYTES_PER_PIXEL * size.width),
                rows_per_image: Some(size.height),
            },
            extent,
        );

        let source = GpuSource { texture, size };
        self.check_errors("source upload").await?;
        Ok(source)
    }

    async fn find_opaque_bounds(&self, source: &GpuSource, area: TexelRect) -> Result<Option<TexelRect>> {
        check_area(source.size, area)?;
        let device = self.device();
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let bounds_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Bounds Accumulator Buffer"),
            contents: bytemuck::bytes_of(&BoundingBox::unset(0)),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        });
        let area_uniform = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Bounds Location Buffer"),
            contents: bytemuck::bytes_of(&CheckArea {
                origin: [area.x, area.y],
                size: [area.width, area.height],
            }),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let read_back = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("AABB Readback Buffer"),
            size: BOUNDING_BOX_SIZE,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let source_view = source.texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            ..Default::default()
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Bounds Detection Bind Group"),
            layout: &self.pipelines.bounds_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&source_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: bounds_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: area_uniform.as_entire_binding(),
                },
            ],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Bounds Pass Encoder"),
        });
        self.dispatch("find bounds", &self.pipelines.bounds, &bind_group, area.size(), &mut encoder);
        encoder.copy_buffer_to_buffer(&bounds_buffer, 0, &read_back, 0, BOUNDING_BOX_SIZE);
        self.context.queue.submit(Some(encoder.finish()));
        self.check_errors("bounds pass").await?;

        // Crop bounds depend on this readback; nothing else is dispatched until it lands.
        let data = read_buffer(device, &read_back).await;
        bounds_buffer.destroy();
        area_uniform.destroy();
        read_back.destroy();
        let data = data?;

        let bounds: BoundingBox = bytemuck::pod_read_unaligned(&data[..BOUNDING_BOX_SIZE as usize]);
        if bounds.is_unset() {
            return Ok(None);
        }
        Ok(Some(TexelRect::from_inclusive(
            bounds.min_x,
            bounds.min_y,
            bounds.max_x,
            bounds.max_y,
        )))
    }

    async fn crop(&self, source: &GpuSource, bounds: TexelRect) -> Result<RgbaImage> {
        check_area(source.size, bounds)?;
        let device = self.device();
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let uniform = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Cropping Bounds Uniform Buffer"),
            contents: bytemuck::bytes_of(&BoundingBox {
                min_x: bounds.x,
                min_y: bounds.y,
                max_x: bounds.right() - 1,
                max_y: bounds.bottom() - 1,
                layer: 0,
                _padding: [0; 3],
            }),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let output = self.storage_output("Cropped Texture", bounds.size());

        let source_view = source.texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            ..Default::default()
        });
        let output_view = output.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Cropping Bind Group"),
            layout: &self.pipelines.crop_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&source_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&output_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: uniform.as_entire_binding(),
                },
            ],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Crop Pass Encoder"),
        });
        self.dispatch("crop", &self.pipelines.crop, &bind_group, bounds.size(), &mut encoder);
        self.context.queue.submit(Some(encoder.finish()));
        self.check_errors("crop pass").await?;

        let image = read_texture(device, &self.context.queue, &output).await;
        output.destroy();
        uniform.destroy();
        image
    }

    async fn missing_texture(&self, size: Size<u32>) -> Result<RgbaImage> {
        let device = self.device();
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let output = self.storage_output("Missing Placeholder Texture", size);
        let output_view = output.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Missing Texture Bind Group"),
            layout: &self.pipelines.missing_texture_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&output_view),
            }],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Missing Texture Encoder"),
        });
        self.dispatch("missing texture", &self.pipelines.missing_texture, &bind_group, size, &mut encoder);
        self.context.queue.submit(Some(encoder.finish()));
        self.check_errors("missing texture pass").await?;

        let image = read_texture(device, &self.context.queue, &output).await;
        output.destroy();
        image
    }

    fn write_layer(&mut self, index: u32, atlas: &CpuTextureAtlas) -> Result<()> {
        let device = Arc::clone(&self.context.device);
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Atlas Upload Encoder"),
        });
        self.atlas.upload(&device, &mut encoder, index, atlas);
        self.context.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn release_layer(&mut self, index: u32) {
        // The whole layer is overwritten on its next upload.
        debug!("Atlas layer {} released", index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{AssetStore, BundleOptions};
    use crate::textures::cpu_backend::CpuBackend;
    use futures::executor::block_on;
    use image::Rgba;

    fn gpu_backend() -> Option<GpuBackend> {
        gpu_backend_with(Limits::new(256, 4))
    }

    fn gpu_backend_with(limits: Limits) -> Option<GpuBackend> {
        let context = block_on(GpuContext::headless()).ok()?;
        GpuBackend::new(context, &limits).ok()
    }

    fn sprite() -> Arc<RgbaImage> {
        let mut image = RgbaImage::new(70, 45);
        for y in 10..20 {
            for x in 33..61 {
                image.put_pixel(x, y, Rgba([x as u8, y as u8, 7, 255]));
            }
        }
        Arc::new(image)
    }

    #[test]
    fn test_workgroup_counts_round_up() {
        assert_eq!(workgroups(1), 1);
        assert_eq!(workgroups(8), 1);
        assert_eq!(workgroups(9), 2);
    }

    #[test]
    fn test_gpu_bounds_and_crop_match_cpu() {
        let Some(gpu) = gpu_backend() else {
            eprintln!("no GPU adapter available, skipping");
            return;
        };
        let cpu = CpuBackend::new();
        let image = sprite();
        let full = TexelRect::new(0, 0, 70, 45);

        let gpu_source = block_on(gpu.prepare_source(&image)).unwrap();
        let cpu_source = block_on(cpu.prepare_source(&image)).unwrap();

        let gpu_bounds = block_on(gpu.find_opaque_bounds(&gpu_source, full)).unwrap();
        let cpu_bounds = block_on(cpu.find_opaque_bounds(&cpu_source, full)).unwrap();
        assert_eq!(gpu_bounds, Some(TexelRect::new(33, 10, 28, 10)));
        assert_eq!(gpu_bounds, cpu_bounds);

        let bounds = gpu_bounds.unwrap();
        let gpu_crop = block_on(gpu.crop(&gpu_source, bounds)).unwrap();
        let cpu_crop = block_on(cpu.crop(&cpu_source, bounds)).unwrap();
        assert_eq!(gpu_crop, cpu_crop);
    }

    #[test]
    fn test_gpu_transparent_area_has_no_bounds() {
        let Some(gpu) = gpu_backend() else {
            eprintln!("no GPU adapter available, skipping");
            return;
        };
        let source = block_on(gpu.prepare_source(&sprite())).unwrap();
        let empty = TexelRect::new(0, 0, 30, 45);
        assert_eq!(block_on(gpu.find_opaque_bounds(&source, empty)).unwrap(), None);
    }

    #[test]
    fn test_gpu_checkerboard_matches_cpu() {
        let Some(gpu) = gpu_backend() else {
            eprintln!("no GPU adapter available, skipping");
            return;
        };
        let size = Size::new(60, 33);
        let gpu_image = block_on(gpu.missing_texture(size)).unwrap();
        let cpu_image = block_on(CpuBackend::new().missing_texture(size)).unwrap();
        assert_eq!(gpu_image, cpu_image);
    }

    #[test]
    fn test_gpu_store_matches_cpu_store() {
        let limits = Limits::new(64, 8);
        let Some(gpu) = gpu_backend_with(limits) else {
            eprintln!("no GPU adapter available, skipping");
            return;
        };
        let initial_layers = gpu.atlas().layer_count();

        // Cropped and tiled, fully transparent, tiled opaque, and one layer-filling panel.
        let options = || {
            BundleOptions::new()
                .texture("sprite", sprite().as_ref().clone())
                .texture("ghost", RgbaImage::new(30, 20))
                .texture("backdrop", RgbaImage::from_pixel(150, 40, Rgba([40, 80, 120, 255])))
                .texture("panel", RgbaImage::from_fn(64, 50, |x, y| Rgba([x as u8, y as u8, 200, 255])))
                .crop_transparent_pixels(true)
                .auto_load(true)
        };

        let mut gpu_store = AssetStore::new(gpu, limits).unwrap();
        let mut cpu_store = AssetStore::new(CpuBackend::new(), limits).unwrap();
        block_on(gpu_store.register_bundle("scene", options())).unwrap();
        block_on(cpu_store.register_bundle("scene", options())).unwrap();

        assert_eq!(gpu_store.texture_ids(), cpu_store.texture_ids());
        for id in cpu_store.texture_ids() {
            assert_eq!(
                gpu_store.get_atlas_coords(&id).unwrap(),
                cpu_store.get_atlas_coords(&id).unwrap(),
                "{id}"
            );
            assert_eq!(gpu_store.get_size(&id).unwrap(), cpu_store.get_size(&id).unwrap());
        }

        let layers = cpu_store.layers_in_use();
        assert!(layers >= 3);
        assert_eq!(gpu_store.layers_in_use(), layers);
        assert!(gpu_store.backend().atlas().layer_count() > initial_layers);

        for index in 0..layers {
            let gpu_layer = block_on(gpu_store.backend().read_layer(index)).unwrap();
            let cpu_layer = cpu_store.backend().layer(index).unwrap();
            assert!(gpu_layer == *cpu_layer, "layer {index} differs");
        }
    }
}
