use anyhow::Context as _;

use crate::data_structures::texture;

/// Bind group layout of a material: colour map, normal map, material uniform and specular map.
pub fn material_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 3,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 4,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 5,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 6,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
        label: Some("material_bind_group_layout"),
    })
}

/// Where models and textures are fetched from.
///
/// Natively this is a directory (`./assets` by default). On the web it is the
/// page origin followed by `/assets`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Assets {
    root: String,
}

impl Default for Assets {
    fn default() -> Self {
        #[cfg(target_arch = "wasm32")]
        {
            let origin = web_sys::window()
                .and_then(|window| window.location().origin().ok())
                .unwrap_or_default();
            Self::new(&format!("{}/assets", origin))
        }
        #[cfg(not(target_arch = "wasm32"))]
        {
            Self::new("./assets")
        }
    }
}

impl Assets {
    pub fn new(root: &str) -> Self {
        Self {
            root: root.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Full path (or URL) of `file_name`.
    pub fn resolve(&self, file_name: &str) -> String {
        format!("{}/{}", self.root, file_name.trim_start_matches("./"))
    }

    /// Resolve `uri` relative to the directory of `base`, as glTF does for external buffers and images.
    pub fn sibling(base: &str, uri: &str) -> String {
        match base.rfind('/') {
            Some(idx) => format!("{}/{}", &base[..idx], uri),
            None => uri.to_string(),
        }
    }

    pub async fn load_binary(&self, file_name: &str) -> anyhow::Result<Vec<u8>> {
        let location = self.resolve(file_name);
        log::info!("Loading file: {}", location);
        #[cfg(target_arch = "wasm32")]
        let data = {
            let url = reqwest::Url::parse(&location)
                .with_context(|| format!("Invalid asset url {}", location))?;
            reqwest::get(url)
                .await
                .with_context(|| format!("Failed to fetch {}", location))?
                .error_for_status()?
                .bytes()
                .await?
                .to_vec()
        };
        #[cfg(not(target_arch = "wasm32"))]
        let data = std::fs::read(&location).with_context(|| format!("Failed to read {}", location))?;

        Ok(data)
    }

    /// Decode an image asset into RGBA8 pixels.
    pub async fn load_image(&self, file_name: &str) -> anyhow::Result<image::RgbaImage> {
        let data = self.load_binary(file_name).await?;
        let extension = file_name.rsplit('.').next();
        texture::decode_image(&data, extension)
            .with_context(|| format!("Failed to decode image {}", file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_resolve_below_the_root() {
        let assets = Assets::new("./assets/");
        assert_eq!(assets.resolve("models/facecap.glb"), "./assets/models/facecap.glb");
        assert_eq!(assets.resolve("./a.png"), "./assets/a.png");
    }

    #[test]
    fn siblings_share_the_directory() {
        assert_eq!(
            Assets::sibling("models/LeePerrySmith/LeePerrySmith.glb", "Map-COL.jpg"),
            "models/LeePerrySmith/Map-COL.jpg"
        );
        assert_eq!(Assets::sibling("scene.gltf", "scene.bin"), "scene.bin");
    }

    #[test]
    fn missing_files_report_their_path() {
        let assets = Assets::new("./does-not-exist");
        let err = futures::executor::block_on(assets.load_binary("nothing.glb"))
            .expect_err("file should be missing");
        assert!(format!("{err:#}").contains("does-not-exist/nothing.glb"));
    }
}
