// Compute pipelines for bounds detection, cropping and the missing-texture fill.

/// Storage buffer layout shared with `find_bounds.wgsl`; also the crop uniform.
/// Padded to 32 bytes so the same bytes serve both bindings.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BoundingBox {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
    pub layer: u32,
    pub _padding: [u32; 3],
}

impl BoundingBox {
    pub const MAX_BOUND: u32 = 0xffff_ffff;
    pub const MIN_BOUND: u32 = 0x0000_0000;

    /// Sentinel seed for the atomic reduction.
    pub fn unset(layer: u32) -> Self {
        Self {
            min_x: Self::MAX_BOUND,
            min_y: Self::MAX_BOUND,
            max_x: Self::MIN_BOUND,
            max_y: Self::MIN_BOUND,
            layer,
            _padding: [0; 3],
        }
    }

    pub fn is_unset(&self) -> bool {
        self.min_x == Self::MAX_BOUND || self.min_y == Self::MAX_BOUND
    }
}

/// Uniform for `find_bounds.wgsl`: the sub-area of the source to scan.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CheckArea {
    pub origin: [u32; 2],
    pub size: [u32; 2],
}

#[derive(Debug)]
pub struct TextureComputePipelines {
    pub bounds: wgpu::ComputePipeline,
    pub bounds_layout: wgpu::BindGroupLayout,
    pub crop: wgpu::ComputePipeline,
    pub crop_layout: wgpu::BindGroupLayout,
    pub missing_texture: wgpu::ComputePipeline,
    pub missing_texture_layout: wgpu::BindGroupLayout,
}

fn storage_texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format: wgpu::TextureFormat::Rgba8Unorm,
            view_dimension: wgpu::TextureViewDimension::D2,
        },
        count: None,
    }
}

fn buffer_entry(binding: u32, ty: wgpu::BufferBindingType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn sampled_texture_entry(binding: u32, view_dimension: wgpu::TextureViewDimension) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension,
            multisampled: false,
        },
        count: None,
    }
}

fn compute_pipeline(
    device: &wgpu::Device,
    label: &str,
    source: &str,
    entry_point: &str,
    layout: &wgpu::BindGroupLayout,
) -> wgpu::ComputePipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });

    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        module: &shader,
        entry_point,
    })
}

impl TextureComputePipelines {
    pub fn new(device: &wgpu::Device) -> Self {
        let bounds_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Bounds Detection Layout"),
            entries: &[
                sampled_texture_entry(0, wgpu::TextureViewDimension::D2Array),
                buffer_entry(1, wgpu::BufferBindingType::Storage { read_only: false }),
                buffer_entry(2, wgpu::BufferBindingType::Uniform),
            ],
        });

        let crop_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Cropping Layout"),
            entries: &[
                sampled_texture_entry(0, wgpu::TextureViewDimension::D2Array),
                storage_texture_entry(1),
                buffer_entry(2, wgpu::BufferBindingType::Uniform),
            ],
        });

        let missing_texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Missing Texture Layout"),
            entries: &[storage_texture_entry(0)],
        });

        let bounds = compute_pipeline(
            device,
            "atlasforge find bounds pipeline",
            include_str!("./shaders/find_bounds.wgsl"),
            "find_bounds",
            &bounds_layout,
        );
        let crop = compute_pipeline(
            device,
            "atlasforge crop pipeline",
            include_str!("./shaders/crop.wgsl"),
            "crop_and_output",
            &crop_layout,
        );
        let missing_texture = compute_pipeline(
            device,
            "atlasforge missing texture pipeline",
            include_str!("./shaders/missing_texture.wgsl"),
            "missing_texture",
            &missing_texture_layout,
        );

        Self {
            bounds,
            bounds_layout,
            crop,
            crop_layout,
            missing_texture,
            missing_texture_layout,
        }
    }
}
