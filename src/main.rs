//! katib-operator - lifecycle manager for the katib-controller service

use std::path::PathBuf;
use std::sync::Arc;

use clap::{ArgAction, Args, Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use katib_operator::apply::KubeApplySink;
use katib_operator::config::{Identity, RuntimeConfig};
use katib_operator::controller::Reconciler;
use katib_operator::descriptor::{DescriptorCompiler, DescriptorContext};
use katib_operator::image::{FixedResolver, ImageDetails};
use katib_operator::pki;
use katib_operator::status::LogStatusReporter;
use katib_operator::template::StaticTemplates;

/// katib-operator - deploys and maintains the katib-controller service
#[derive(Parser, Debug)]
#[command(name = "katib-operator", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one reconciliation attempt against the cluster
    ///
    /// Bootstraps the webhook trust chain (once per process), assembles
    /// the deployment descriptor, and server-side-applies its resource
    /// bundle. Non-leader replicas exit immediately with a success
    /// status.
    Run(RunArgs),

    /// Assemble the deployment descriptor and print it as YAML
    ///
    /// No cluster access: the descriptor is built with a freshly
    /// bootstrapped trust chain and written to stdout.
    Spec(SpecArgs),
}

/// Arguments shared by both modes
#[derive(Args, Debug)]
struct CommonArgs {
    /// Application name the service is deployed under
    #[arg(long, env = "KATIB_APP_NAME", default_value = katib_operator::DEFAULT_APP_NAME)]
    app_name: String,

    /// Operating namespace (model) of the deployment
    #[arg(long, env = "KATIB_MODEL_NAME", default_value = katib_operator::DEFAULT_MODEL_NAME)]
    model_name: String,

    /// Directory holding the static template files
    #[arg(long, env = "KATIB_TEMPLATES_DIR", default_value = "templates")]
    templates_dir: PathBuf,

    /// Admission webhook port
    #[arg(long, env = "KATIB_WEBHOOK_PORT", default_value_t = katib_operator::DEFAULT_WEBHOOK_PORT)]
    webhook_port: u16,

    /// Metrics endpoint port
    #[arg(long, env = "KATIB_METRICS_PORT", default_value_t = katib_operator::DEFAULT_METRICS_PORT)]
    metrics_port: u16,

    /// Resolved katib-controller image reference
    #[arg(long, env = "KATIB_IMAGE")]
    image: String,

    /// Registry username for the controller image
    #[arg(long, env = "KATIB_IMAGE_USERNAME")]
    image_username: Option<String>,

    /// Registry password for the controller image
    #[arg(long, env = "KATIB_IMAGE_PASSWORD")]
    image_password: Option<String>,
}

impl CommonArgs {
    fn identity(&self) -> Identity {
        Identity::new(&self.app_name, &self.model_name)
    }

    fn runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        RuntimeConfig::new(self.webhook_port, self.metrics_port)
            .map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))
    }

    fn image_details(&self) -> ImageDetails {
        ImageDetails {
            image_path: self.image.clone(),
            username: self.image_username.clone(),
            password: self.image_password.clone(),
        }
    }

    fn templates(&self) -> anyhow::Result<StaticTemplates> {
        StaticTemplates::load(&self.templates_dir).map_err(|e| {
            anyhow::anyhow!(
                "failed to load templates from {:?}: {}",
                self.templates_dir,
                e
            )
        })
    }
}

/// Run mode arguments
#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Whether this replica holds leadership for the deployment
    ///
    /// Leadership election happens outside the operator; the elected
    /// state is passed in per attempt.
    #[arg(long, env = "KATIB_LEADER", default_value_t = true, action = ArgAction::Set)]
    leader: bool,
}

/// Spec mode arguments
#[derive(Args, Debug)]
struct SpecArgs {
    #[command(flatten)]
    common: CommonArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run_reconcile(args).await,
        Commands::Spec(args) => run_spec(args),
    }
}

/// Execute one reconciliation attempt
async fn run_reconcile(args: RunArgs) -> anyhow::Result<()> {
    let identity = args.common.identity();
    let config = args.common.runtime_config()?;
    let templates = args.common.templates()?;
    let resolver = FixedResolver::new(args.common.image_details());

    let client = kube::Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;
    let sink = KubeApplySink::new(client, identity.model_name.clone());

    let reconciler = Reconciler::new(
        identity,
        config,
        templates,
        Arc::new(resolver),
        Arc::new(sink),
        Arc::new(LogStatusReporter),
    );

    let status = reconciler
        .reconcile(args.leader)
        .await
        .map_err(|e| anyhow::anyhow!("reconciliation failed: {}", e))?;

    println!("{status}");
    Ok(())
}

/// Assemble the descriptor and print it without applying
fn run_spec(args: SpecArgs) -> anyhow::Result<()> {
    let identity = args.common.identity();
    let config = args.common.runtime_config()?;
    let templates = args.common.templates()?;
    let image = args.common.image_details();

    let certs = pki::bootstrap(&identity.app_name, &identity.model_name)
        .map_err(|e| anyhow::anyhow!("pki bootstrap failed: {}", e))?;

    let descriptor = DescriptorCompiler::compile(&DescriptorContext {
        identity: &identity,
        config,
        image: &image,
        certs: &certs,
        templates: &templates,
    })
    .map_err(|e| anyhow::anyhow!("descriptor assembly failed: {}", e))?;

    let rendered = serde_yaml::to_string(&descriptor)
        .map_err(|e| anyhow::anyhow!("Failed to serialize descriptor: {}", e))?;
    println!("{rendered}");
    Ok(())
}
