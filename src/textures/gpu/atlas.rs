// The atlas texture array sampled by the renderer.
// One array layer per packed CpuTextureAtlas.

use wgpu::util::DeviceExt;

#[allow(unused_imports)]
use log::{debug, info, warn};

use crate::config::BYTES_PER_PIXEL;
use crate::textures::gpu::readback::padded_bytes_per_row;
use crate::textures::types::CpuTextureAtlas;

const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

#[derive(Debug)]
pub struct AtlasTextureArray {
    texture: wgpu::Texture,
    texture_view: wgpu::TextureView,
    size: u32,
    layer_count: u32,
}

fn create_texture(device: &wgpu::Device, size: u32, layers: u32) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("atlasforge::atlas texture array"),
        size: wgpu::Extent3d {
            width: size,
            height: size,
            depth_or_array_layers: layers,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: FORMAT,
        usage: wgpu::TextureUsages::COPY_DST
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    })
}

fn create_view(texture: &wgpu::Texture) -> wgpu::TextureView {
    texture.create_view(&wgpu::TextureViewDescriptor {
        dimension: Some(wgpu::TextureViewDimension::D2Array),
        ..Default::default()
    })
}

impl AtlasTextureArray {
    pub fn new(device: &wgpu::Device, backend: wgpu::Backend, size: u32) -> Self {
        // On the GL backend we start with 2 layers, to help wgpu figure
        // out that this texture is `GL_TEXTURE_2D_ARRAY` rather than `GL_TEXTURE_2D`
        let layer_count = match backend {
            wgpu::Backend::Gl => 2,
            _ => 1,
        };
        info!("Creating atlas texture array {}x{} with {} layer(s)", size, size, layer_count);

        let texture = create_texture(device, size, layer_count);
        let texture_view = create_view(&texture);

        Self {
            texture,
            texture_view,
            size,
            layer_count,
        }
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.texture_view
    }

    pub fn layer_count(&self) -> u32 {
        self.layer_count
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Writes `atlas` into layer `layer`, growing the array first if needed.
    pub fn upload(
        &mut self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        layer: u32,
        atlas: &CpuTextureAtlas,
    ) {
        if layer >= self.layer_count {
            self.grow(layer + 1 - self.layer_count, device, encoder);
        }

        let width = atlas.texture.width();
        let height = atlas.texture.height();
        let data = atlas.texture.as_raw();

        // It is a webgpu requirement that:
        //   BufferCopyView.layout.bytes_per_row % wgpu::COPY_BYTES_PER_ROW_ALIGNMENT == 0
        let row_bytes = (BYTES_PER_PIXEL * width) as usize;
        let padded_width = padded_bytes_per_row(width) as usize;

        let padded_data = if padded_width == row_bytes {
            data.to_vec()
        } else {
            let mut padded_data = vec![0; padded_width * height as usize];
            for row in 0..height as usize {
                let offset = row * padded_width;
                padded_data[offset..offset + row_bytes]
                    .copy_from_slice(&data[row * row_bytes..(row + 1) * row_bytes]);
            }
            padded_data
        };

        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("atlas layer upload buffer"),
            contents: &padded_data,
            usage: wgpu::BufferUsages::COPY_SRC,
        });

        encoder.copy_buffer_to_texture(
            wgpu::ImageCopyBuffer {
                buffer: &buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_width as u32),
                    rows_per_image: Some(height),
                },
            },
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
                aspect: wgpu::TextureAspect::default(),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );

        debug!("Uploaded atlas layer {} ({} textures)", layer, atlas.texture_regions.len());
    }

    /// Reallocates the array with `amount` more layers, copying existing ones over.
    fn grow(&mut self, amount: u32, device: &wgpu::Device, encoder: &mut wgpu::CommandEncoder) {
        if amount == 0 {
            return;
        }

        let new_count = self.layer_count + amount;
        debug!("Growing atlas texture array from {} to {} layers", self.layer_count, new_count);

        let new_texture = create_texture(device, self.size, new_count);

        encoder.copy_texture_to_texture(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::default(),
            },
            wgpu::ImageCopyTexture {
                texture: &new_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::default(),
            },
            wgpu::Extent3d {
                width: self.size,
                height: self.size,
                depth_or_array_layers: self.layer_count,
            },
        );

        self.texture = new_texture;
        self.texture_view = create_view(&self.texture);
        self.layer_count = new_count;
    }

    pub fn destroy(&self) {
        self.texture.destroy();
    }
}
