//! Command line and runtime configuration.
//!
//! The native binary parses [`Cli`] with clap. The web entry point builds a
//! [`ViewerConfig`] from the app name it is started with.

use clap::{Parser, ValueEnum};

use crate::resources::texture::Assets;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum AppKind {
    /// Lit rotating cube
    #[default]
    Basic,
    /// Animated face capture model
    Facecap,
    /// Skinned human with a debug panel
    Human,
    /// Morph target cube
    Morph,
    /// Normal mapped head with post-processing
    Normalmap,
}

impl AppKind {
    pub fn name(&self) -> &'static str {
        match self {
            AppKind::Basic => "basic",
            AppKind::Facecap => "facecap",
            AppKind::Human => "human",
            AppKind::Morph => "morph",
            AppKind::Normalmap => "normalmap",
        }
    }

    pub fn parse(name: &str) -> anyhow::Result<Self> {
        <Self as ValueEnum>::from_str(name, true)
            .map_err(|_| anyhow::anyhow!("Unknown app '{}'", name))
    }
}

/// Scene setup the human viewer starts with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Preset {
    /// Ambient and a camera-attached directional light
    #[default]
    Default,
    /// A single hemisphere light, as used for the glTF sample assets
    AssetGenerator,
}

#[derive(Parser, Debug)]
#[command(name = "view-ngin", version, about = "Small glTF model viewers")]
pub struct Cli {
    /// Which viewer to start
    #[arg(value_enum, default_value_t = AppKind::Basic)]
    pub app: AppKind,

    /// Model file relative to the asset root, replaces the app's default model
    #[arg(long)]
    pub model: Option<String>,

    /// Directory models and textures are loaded from
    #[arg(long, default_value = "./assets")]
    pub assets: String,

    /// Start with the debug panel hidden
    #[arg(long)]
    pub kiosk: bool,

    /// Lighting preset of the human viewer
    #[arg(long, value_enum, default_value_t = Preset::Default)]
    pub preset: Preset,

    /// Overrides RUST_LOG (error, warn, info, debug, trace)
    #[arg(long)]
    pub log_level: Option<log::LevelFilter>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ViewerConfig {
    pub app: AppKind,
    pub model: Option<String>,
    pub assets: Assets,
    pub kiosk: bool,
    pub preset: Preset,
    pub log_level: Option<log::LevelFilter>,
}

impl ViewerConfig {
    pub fn for_app(app: AppKind) -> Self {
        Self {
            app,
            ..Default::default()
        }
    }

    /// The configured model, or `default` when none was given.
    pub fn model_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.model.as_deref().unwrap_or(default)
    }

    pub fn title(&self) -> String {
        format!("view-ngin: {}", self.app.name())
    }
}

impl From<Cli> for ViewerConfig {
    fn from(cli: Cli) -> Self {
        Self {
            app: cli.app,
            model: cli.model,
            assets: Assets::new(&cli.assets),
            kiosk: cli.kiosk,
            preset: cli.preset,
            log_level: cli.log_level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_to_the_basic_app() {
        let cli = Cli::try_parse_from(["view-ngin"]).expect("valid arguments");
        let config = ViewerConfig::from(cli);
        assert_eq!(config.app, AppKind::Basic);
        assert_eq!(config.assets.root(), "./assets");
        assert!(!config.kiosk);
        assert_eq!(config.preset, Preset::Default);
    }

    #[test]
    fn cli_reads_overrides() {
        let cli = Cli::try_parse_from([
            "view-ngin",
            "human",
            "--model",
            "models/Other.glb",
            "--assets",
            "/srv/assets/",
            "--kiosk",
            "--preset",
            "asset-generator",
            "--log-level",
            "debug",
        ])
        .expect("valid arguments");
        let config = ViewerConfig::from(cli);
        assert_eq!(config.app, AppKind::Human);
        assert_eq!(config.model_or("models/Thanh.glb"), "models/Other.glb");
        assert_eq!(config.assets.root(), "/srv/assets");
        assert!(config.kiosk);
        assert_eq!(config.preset, Preset::AssetGenerator);
        assert_eq!(config.log_level, Some(log::LevelFilter::Debug));
    }

    #[test]
    fn app_names_parse_case_insensitively() {
        assert_eq!(AppKind::parse("NormalMap").ok(), Some(AppKind::Normalmap));
        assert!(AppKind::parse("teapot").is_err());
    }
}
