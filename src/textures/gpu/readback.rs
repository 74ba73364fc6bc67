// Copying GPU results back to the host.

use futures::channel::oneshot;
use image::RgbaImage;

use crate::config::BYTES_PER_PIXEL;
use crate::error::{AtlasError, Result};

/// Row pitch of a texture copy, rounded up to `COPY_BYTES_PER_ROW_ALIGNMENT`.
pub fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * BYTES_PER_PIXEL;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let padding = (align - unpadded % align) % align;
    unpadded + padding
}

/// Maps `buffer` for reading and returns its contents. Suspends until the map
/// callback has fired; the device is polled so the callback can run.
pub async fn read_buffer(device: &wgpu::Device, buffer: &wgpu::Buffer) -> Result<Vec<u8>> {
    let slice = buffer.slice(..);
    let (sender, receiver) = oneshot::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    device.poll(wgpu::Maintain::Wait);

    receiver
        .await
        .map_err(|_| AtlasError::gpu("buffer map callback was dropped"))?
        .map_err(|e| AtlasError::gpu(format!("buffer map failed: {e}")))?;

    let data = slice.get_mapped_range().to_vec();
    buffer.unmap();
    Ok(data)
}

/// Reads a single-layer `Rgba8Unorm` texture into an image.
pub async fn read_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
) -> Result<RgbaImage> {
    read_texture_layer(device, queue, texture, 0).await
}

/// Reads array layer `layer` of an `Rgba8Unorm` texture into an image.
pub async fn read_texture_layer(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    layer: u32,
) -> Result<RgbaImage> {
    if layer >= texture.depth_or_array_layers() {
        return Err(AtlasError::gpu(format!(
            "layer {} is out of range for a texture with {} layers",
            layer,
            texture.depth_or_array_layers()
        )));
    }
    let width = texture.width();
    let height = texture.height();
    let padded = padded_bytes_per_row(width);

    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("atlasforge texture readback buffer"),
        size: padded as u64 * height as u64,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Texture Readback Encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::ImageCopyTexture {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::ImageCopyBuffer {
            buffer: &staging,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(padded),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(Some(encoder.finish()));

    let mapped = read_buffer(device, &staging).await;
    staging.destroy();
    let mapped = mapped?;

    // De-pad rows into a tight RGBA buffer.
    let row_bytes = (width * BYTES_PER_PIXEL) as usize;
    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in mapped.chunks_exact(padded as usize) {
        pixels.extend_from_slice(&row[..row_bytes]);
    }

    RgbaImage::from_raw(width, height, pixels)
        .ok_or_else(|| AtlasError::gpu("readback size does not match texture size"))
}
