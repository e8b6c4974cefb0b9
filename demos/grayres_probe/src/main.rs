use anyhow::bail;
use burn::backend::NdArray;
use burn::prelude::Tensor;
use clap::Parser;
use grayres::checkpoint::CheckpointStoreConfig;
use grayres::models::resnet::head::HeadPoolConfig;
use grayres::models::resnet::prefabs::{lookup_prefab, prefab_names};
use grayres::models::resnet::{ResNet, ResNetMeta, ResNetStructureConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Model prefab name.
    #[arg(long, default_value = "resnet50")]
    prefab: String,

    /// Number of output classes.
    #[arg(long, default_value = "2")]
    num_classes: usize,

    /// Number of input image channels.
    #[arg(long, default_value = "1")]
    input_channel: usize,

    /// Bottleneck expansion factor.
    #[arg(long, default_value = "4")]
    expansion: usize,

    /// Square input resolution.
    #[arg(long, default_value = "1180")]
    resolution: usize,

    /// Batch size.
    #[arg(long, default_value = "1")]
    batch: usize,

    /// Use an adaptive head pool instead of the fixed 10x10 pool.
    #[arg(long)]
    adaptive_pool: bool,

    /// Checkpoint store root directory.
    #[arg(long)]
    checkpoint_dir: Option<String>,

    /// Checkpoint tag.
    #[arg(long)]
    tag: Option<String>,

    /// Save the model to the checkpoint store.
    #[arg(long)]
    save: bool,

    /// Load the model from the checkpoint store instead of building it.
    ///
    /// The checkpoint carries its own config, so the model shape flags are rejected.
    #[arg(
        long,
        conflicts_with_all = ["prefab", "num_classes", "input_channel", "expansion", "adaptive_pool"]
    )]
    load: bool,
}

fn build_config(args: &Args) -> anyhow::Result<ResNetStructureConfig> {
    let prefab = match lookup_prefab(&args.prefab) {
        Some(prefab) => prefab,
        None => bail!(
            "unknown prefab {:?}; expected one of {:?}",
            args.prefab,
            prefab_names()
        ),
    };

    let head_pool = if args.adaptive_pool {
        HeadPoolConfig::adaptive()
    } else {
        HeadPoolConfig::default()
    };

    let config = prefab
        .new_config()
        .with_num_classes(args.num_classes)
        .with_input_channel(args.input_channel)
        .with_expansion(args.expansion)
        .with_head_pool(head_pool);
    config.try_validate().map_err(anyhow::Error::msg)?;

    Ok(config.to_structure())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(anyhow::Error::msg)?;

    type B = NdArray<f32>;
    let device = Default::default();

    let store = args
        .checkpoint_dir
        .as_ref()
        .map(|dir| CheckpointStoreConfig::new(dir.clone()));
    if (args.save || args.load) && store.is_none() {
        bail!("--save and --load require --checkpoint-dir");
    }
    let model_name = ResNet::<B>::MODEL_NAME;
    let tag = args.tag.as_deref();

    let (config, model): (ResNetStructureConfig, ResNet<B>) = match &store {
        Some(store) if args.load => store.load_with_config(model_name, tag, &device)?,
        _ => {
            let config = build_config(&args)?;
            let model = config.clone().init(&device);
            (config, model)
        }
    };

    let resolution = [args.resolution, args.resolution];
    config
        .try_validate_input_resolution(resolution)
        .map_err(anyhow::Error::msg)?;
    tracing::info!(
        feature_resolution = ?config.try_feature_resolution(resolution),
        "probing"
    );

    let input: Tensor<B, 4> = Tensor::zeros(
        [args.batch, model.in_channels(), args.resolution, args.resolution],
        &device,
    );
    let logits = model.forward(input);
    println!("logits shape: {:?}", logits.dims());

    if let (Some(store), true) = (&store, args.save) {
        let dir = store.save(&model, &config, model_name, tag)?;
        println!("saved: {}", dir.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_conflicts_with_model_flags() {
        let args = Args::try_parse_from([
            "grayres",
            "--load",
            "--checkpoint-dir",
            "/tmp/store",
            "--tag",
            "a",
        ])
        .unwrap();
        assert!(args.load);
        assert_eq!(args.prefab, "resnet50");

        for flag in [
            ["--prefab", "resnet101"],
            ["--num-classes", "5"],
            ["--input-channel", "3"],
            ["--expansion", "2"],
        ] {
            let err = Args::try_parse_from([
                "grayres",
                "--load",
                "--checkpoint-dir",
                "/tmp/store",
                flag[0],
                flag[1],
            ])
            .unwrap_err();
            assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
        }

        let err = Args::try_parse_from(["grayres", "--load", "--adaptive-pool"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_build_config() {
        let args = Args::try_parse_from([
            "grayres",
            "--prefab",
            "resnet101",
            "--num-classes",
            "5",
            "--adaptive-pool",
        ])
        .unwrap();
        let config = build_config(&args).unwrap();
        assert_eq!(config.num_classes(), 5);
        assert_eq!(config.layers[2].blocks.len(), 23);

        let args = Args::try_parse_from(["grayres", "--prefab", "resnet18"]).unwrap();
        assert!(build_config(&args).is_err());
    }
}
