// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the three subcommands: `train`, `predict` and `serve`
// and all their configurable flags.
//
// Paths and the server address can also come from the
// environment (ALZ_* variables), which is how a container
// deployment configures them.

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::application::train_use_case::TrainConfig;
use crate::data::preprocessor::Normalization;
use crate::ml::backbone::{vgg16_layout, VGG16_IMAGENET_URL};
use crate::server::ServerConfig;

/// The three top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fine-tune the classifier on a folder of labelled scans
    Train(TrainArgs),

    /// Classify a single scan file and print the JSON prediction
    Predict(PredictArgs),

    /// Serve predictions over HTTP
    Serve(ServeArgs),
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Directory with one sub-directory of images per class
    #[arg(long, env = "ALZ_TRAIN_DIR", default_value = "train")]
    pub train_dir: String,

    /// Directory for checkpoints, the model manifest and metrics.csv
    #[arg(long, env = "ALZ_CHECKPOINT_DIR", default_value = ".")]
    pub checkpoint_dir: String,

    /// Side length images are resized to
    #[arg(long, default_value_t = 224)]
    pub image_size: usize,

    #[arg(long, default_value_t = 16)]
    pub batch_size: usize,

    /// Seed for the train/validation split and shuffling
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Share of images held out for validation
    #[arg(long, default_value_t = 0.2)]
    pub validation_split: f64,

    /// Epochs with the whole backbone frozen
    #[arg(long, default_value_t = 5)]
    pub warmup_epochs: usize,

    /// Epochs with the top backbone block trainable
    #[arg(long, default_value_t = 15)]
    pub finetune_epochs: usize,

    #[arg(long, default_value_t = 1e-4)]
    pub warmup_lr: f64,

    #[arg(long, default_value_t = 1e-5)]
    pub finetune_lr: f64,

    /// Width of the hidden dense layer
    #[arg(long, default_value_t = 256)]
    pub hidden_units: usize,

    #[arg(long, default_value_t = 0.5)]
    pub dropout: f64,

    /// Backbone blocks (from the top) unfrozen for fine-tuning
    #[arg(long, default_value_t = 1)]
    pub trainable_top_blocks: usize,

    /// Pretrained VGG16 backbone: torchvision-layout .safetensors or a
    /// Burn record. Defaults to <checkpoint-dir>/vgg16_imagenet.safetensors
    #[arg(long, env = "ALZ_BACKBONE_WEIGHTS")]
    pub backbone_weights: Option<String>,

    /// Download URL for the backbone file when it is not on disk
    #[arg(long, env = "ALZ_BACKBONE_URL", default_value = VGG16_IMAGENET_URL)]
    pub backbone_url: String,

    /// Start from a randomly initialised backbone
    #[arg(long)]
    pub no_pretrained: bool,

    /// Pixel normalisation: torch (matches the ImageNet weights) or caffe
    #[arg(long, default_value = "torch")]
    pub normalization: Normalization,

    /// Data loader worker threads
    #[arg(long, default_value_t = 2)]
    pub num_workers: usize,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            train_dir:            a.train_dir,
            checkpoint_dir:       a.checkpoint_dir,
            image_size:           a.image_size,
            batch_size:           a.batch_size,
            seed:                 a.seed,
            validation_split:     a.validation_split,
            warmup_epochs:        a.warmup_epochs,
            finetune_epochs:      a.finetune_epochs,
            warmup_lr:            a.warmup_lr,
            finetune_lr:          a.finetune_lr,
            hidden_units:         a.hidden_units,
            dropout:              a.dropout,
            trainable_top_blocks: a.trainable_top_blocks,
            pretrained:           !a.no_pretrained,
            backbone_weights:     a.backbone_weights,
            backbone_url:         Some(a.backbone_url).filter(|u| !u.is_empty()),
            normalization:        a.normalization,
            num_workers:          a.num_workers,
            backbone_layout:      vgg16_layout(),
        }
    }
}

/// Where the serving model comes from; shared by `predict` and `serve`
#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    /// Directory holding checkpoints and model_manifest.json
    #[arg(long, env = "ALZ_CHECKPOINT_DIR", default_value = ".")]
    pub checkpoint_dir: String,

    /// Explicit model file (defaults to the final, then newest epoch checkpoint)
    #[arg(long, env = "ALZ_MODEL")]
    pub model: Option<PathBuf>,

    /// URL to download the model from when it is not on disk
    #[arg(long, env = "ALZ_MODEL_URL")]
    pub model_url: Option<String>,
}

/// All arguments for the `predict` command
#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Scan to classify (.png, .jpg, .dcm, ...)
    #[arg(long)]
    pub file: PathBuf,

    #[command(flatten)]
    pub model: ModelArgs,
}

/// All arguments for the `serve` command
#[derive(Args, Debug)]
pub struct ServeArgs {
    #[arg(long, env = "ALZ_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "ALZ_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Maximum upload size in bytes
    #[arg(long, default_value_t = 20 * 1024 * 1024)]
    pub max_body_size: usize,

    /// Page served at GET /
    #[arg(long, default_value = "index.html")]
    pub index_file: String,

    /// Directory served under /assets
    #[arg(long, default_value = "assets")]
    pub assets_dir: String,

    /// Directory served under /static
    #[arg(long, default_value = ".")]
    pub static_dir: String,

    /// Disable the permissive CORS layer
    #[arg(long)]
    pub no_cors: bool,

    #[command(flatten)]
    pub model: ModelArgs,
}

impl From<&ServeArgs> for ServerConfig {
    fn from(a: &ServeArgs) -> Self {
        ServerConfig {
            host:          a.host.clone(),
            port:          a.port,
            max_body_size: a.max_body_size,
            cors_enabled:  !a.no_cors,
            index_file:    a.index_file.clone(),
            assets_dir:    a.assets_dir.clone(),
            static_dir:    a.static_dir.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    #[test]
    fn test_train_defaults_match_config_defaults() {
        let cli = Cli::try_parse_from(["alz-scan", "train", "--train-dir", "scans"]).unwrap();
        let Commands::Train(args) = cli.command else {
            panic!("expected train");
        };
        let cfg: TrainConfig = args.into();
        let def = TrainConfig::default();

        assert_eq!(cfg.train_dir, "scans");
        assert_eq!(cfg.batch_size, def.batch_size);
        assert_eq!(cfg.warmup_epochs, def.warmup_epochs);
        assert_eq!(cfg.finetune_epochs, def.finetune_epochs);
        assert_eq!(cfg.warmup_lr, def.warmup_lr);
        assert_eq!(cfg.finetune_lr, def.finetune_lr);
        assert_eq!(cfg.normalization, def.normalization);
        assert_eq!(cfg.backbone_layout.len(), 5);
        assert!(cfg.pretrained);
        assert_eq!(cfg.backbone_url, def.backbone_url);
    }

    #[test]
    fn test_no_pretrained_flag() {
        let cli = Cli::try_parse_from(["alz-scan", "train", "--no-pretrained"]).unwrap();
        let Commands::Train(args) = cli.command else {
            panic!("expected train");
        };
        let cfg: TrainConfig = args.into();
        assert!(!cfg.pretrained);
    }

    #[test]
    fn test_serve_args_to_server_config() {
        let cli = Cli::try_parse_from([
            "alz-scan", "serve", "--port", "9000", "--no-cors", "--model", "m.mpk.gz",
        ])
        .unwrap();
        let Commands::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        let cfg = ServerConfig::from(&args);

        assert_eq!(cfg.port, 9000);
        assert!(!cfg.cors_enabled);
        assert_eq!(cfg.max_body_size, 20 * 1024 * 1024);
        assert_eq!(args.model.model, Some(PathBuf::from("m.mpk.gz")));
    }

    #[test]
    fn test_predict_requires_file() {
        assert!(Cli::try_parse_from(["alz-scan", "predict"]).is_err());
    }
}
