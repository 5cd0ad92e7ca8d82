mod config;

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use uuid::Uuid;

use orch_core::domain::DeploymentIntent;
use orch_core::infra::{PostgresDeploymentRepository, PostgresLock, PostgresTaskRepository};
use orch_core::ports::{LoggingEventSink, TaskRepository};
use orch_core::service::DeploymentService;
use orch_db::pool;

use config::OrchestratorConfig;

#[derive(Parser)]
#[command(name = "orchestrator", about = "Multi-cloud deployment orchestrator")]
struct Cli {
    /// Database URL (overrides ORCH_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an orchestrator config file (no database required)
    Init {
        #[arg(long, default_value = "postgresql://localhost:5432/orchestrator")]
        db_url: String,
        #[arg(long)]
        force: bool,
    },
    /// Create and migrate the orchestrator database
    DbInit,
    /// Create a deployment from a JSON intent file
    Create {
        /// Path to a JSON-encoded DeploymentIntent
        intent_file: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        initiated_by: String,
        #[arg(long)]
        tenant_id: String,
    },
    /// Generate an execution plan for a deployment
    Plan { deployment_id: String },
    /// Approve a planned deployment awaiting approval
    Approve {
        deployment_id: String,
        #[arg(long)]
        approved_by: String,
    },
    /// Materialize and queue tasks for an approved deployment
    Execute { deployment_id: String },
    /// Report a task's terminal outcome (used by out-of-process executors)
    Complete {
        task_id: String,
        #[arg(long)]
        success: bool,
        #[arg(long)]
        output: Option<String>,
        #[arg(long)]
        error: Option<String>,
    },
    /// Show deployment status and its tasks
    Status { deployment_id: String },
    /// List deployments, optionally filtered by status
    List {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        tenant_id: Option<String>,
    },
    /// Roll back a deployment, materializing compensating destroy tasks
    Rollback { deployment_id: String },
    /// Requeue tasks orphaned by a crashed worker
    ResetOrphaned { deployment_id: String },
}

async fn cmd_init(db_url: &str, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();
    if path.exists() && !force {
        anyhow::bail!("config file already exists at {}\nUse --force to overwrite.", path.display());
    }

    let cfg = config::ConfigFile { database: config::DatabaseSection { url: db_url.to_string() } };
    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!();
    println!("Next: run `orchestrator db-init` to create and migrate the database.");
    Ok(())
}

async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let resolved = OrchestratorConfig::resolve(cli_db_url)?;

    println!("Initializing orchestrator database...");
    pool::ensure_database_exists(&resolved.db_config).await?;
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    pool::run_migrations(&db_pool, &pool::default_migrations_path()).await?;

    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }
    db_pool.close().await;
    println!("orchestrator db-init complete.");
    Ok(())
}

fn parse_uuid(s: &str, what: &str) -> anyhow::Result<Uuid> {
    Uuid::parse_str(s).with_context(|| format!("invalid {what}: {s}"))
}

fn deployment_service(
    pool: sqlx::PgPool,
) -> (DeploymentService, Arc<PostgresTaskRepository>, Arc<PostgresDeploymentRepository>) {
    let deployments = Arc::new(PostgresDeploymentRepository::new(pool.clone()));
    let tasks = Arc::new(PostgresTaskRepository::new(pool.clone()));
    let lock = Arc::new(PostgresLock::new(pool.clone()));
    let events = Arc::new(LoggingEventSink);
    let service = DeploymentService::new(deployments.clone(), tasks.clone(), lock, events);
    (service, tasks, deployments)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { db_url, force } => {
            cmd_init(&db_url, force).await?;
        }
        Commands::DbInit => {
            cmd_db_init(cli.database_url.as_deref()).await?;
        }
        Commands::Create { intent_file, name, initiated_by, tenant_id } => {
            let resolved = OrchestratorConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let (service, _tasks, _deployments) = deployment_service(db_pool.clone());

            let contents = std::fs::read_to_string(&intent_file)
                .with_context(|| format!("reading intent file {intent_file}"))?;
            let intent: DeploymentIntent =
                serde_json::from_str(&contents).context("parsing intent file as JSON")?;

            let deployment = service.create_deployment(intent, name, initiated_by, tenant_id).await?;
            db_pool.close().await;
            println!("Created deployment {} ({})", deployment.id, deployment.name);
        }
        Commands::Plan { deployment_id } => {
            let id = parse_uuid(&deployment_id, "deployment ID")?;
            let resolved = OrchestratorConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let (service, _tasks, _deployments) = deployment_service(db_pool.clone());

            let deployment = service.plan_deployment(id).await?;
            db_pool.close().await;
            let plan = deployment.plan.as_ref().expect("plan_deployment always attaches a plan");
            println!("Deployment {} planned: status={}", deployment.id, deployment.status);
            println!("  steps: {}", plan.steps.len());
            println!("  estimated_total_duration_seconds: {}", plan.estimated_total_duration_seconds);
            println!("  risk_assessment: {}", plan.risk_assessment);
        }
        Commands::Approve { deployment_id, approved_by } => {
            let id = parse_uuid(&deployment_id, "deployment ID")?;
            let resolved = OrchestratorConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let (service, _tasks, _deployments) = deployment_service(db_pool.clone());

            let deployment = service.approve_deployment(id, &approved_by).await?;
            db_pool.close().await;
            println!("Deployment {} approved: status={}", deployment.id, deployment.status);
        }
        Commands::Execute { deployment_id } => {
            let id = parse_uuid(&deployment_id, "deployment ID")?;
            let resolved = OrchestratorConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let (service, _tasks, _deployments) = deployment_service(db_pool.clone());

            let tasks = service.execute_deployment(id).await?;
            db_pool.close().await;
            println!("Queued {} task(s) for deployment {id}", tasks.len());
            for task in &tasks {
                println!("  {} {} ({})", task.id, task.name, task.status);
            }
        }
        Commands::Complete { task_id, success, output, error } => {
            let id = parse_uuid(&task_id, "task ID")?;
            let resolved = OrchestratorConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let (service, _tasks, _deployments) = deployment_service(db_pool.clone());

            let output_value = output.map(|s| serde_json::from_str(&s)).transpose().context("parsing --output as JSON")?;
            let deployment = service.handle_task_completion(id, success, output_value, error).await?;
            db_pool.close().await;
            println!("Deployment {} status after completion: {}", deployment.id, deployment.status);
        }
        Commands::Status { deployment_id } => {
            let id = parse_uuid(&deployment_id, "deployment ID")?;
            let resolved = OrchestratorConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let deployments = PostgresDeploymentRepository::new(db_pool.clone());
            let tasks_repo = PostgresTaskRepository::new(db_pool.clone());

            use orch_core::ports::DeploymentRepository;
            let deployment = deployments.get(id).await?.with_context(|| format!("deployment {id} not found"))?;
            let tasks = tasks_repo.list_by_deployment(id).await?;
            db_pool.close().await;

            println!("Deployment: {} ({})", deployment.name, deployment.id);
            println!("Status: {}", deployment.status);
            println!("Tenant: {}", deployment.tenant_id);
            println!("Initiated by: {}", deployment.initiated_by);
            if let Some(err) = &deployment.error_message {
                println!("Error: {err}");
            }
            println!();
            println!("Tasks:");
            for task in &tasks {
                println!("  [{}] {} (attempt {}/{}, {})", task.status, task.name, task.attempt_number, task.max_attempts, task.id);
            }
        }
        Commands::List { status, tenant_id } => {
            let resolved = OrchestratorConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let deployments = PostgresDeploymentRepository::new(db_pool.clone());

            use orch_core::ports::DeploymentRepository;
            let results = if let Some(status) = &status {
                let parsed = status.parse().map_err(|e: orch_core::domain::deployment::DeploymentStatusParseError| anyhow::anyhow!(e.to_string()))?;
                deployments.list_by_status(parsed).await?
            } else if let Some(tenant_id) = &tenant_id {
                deployments.list_by_tenant(tenant_id).await?
            } else {
                anyhow::bail!("list requires either --status or --tenant-id");
            };
            db_pool.close().await;

            println!("{:<38} {:<30} {:<20}", "ID", "NAME", "STATUS");
            for deployment in &results {
                println!("{:<38} {:<30} {:<20}", deployment.id, deployment.name, deployment.status);
            }
        }
        Commands::Rollback { deployment_id } => {
            let id = parse_uuid(&deployment_id, "deployment ID")?;
            let resolved = OrchestratorConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let (service, _tasks, _deployments) = deployment_service(db_pool.clone());

            let deployment = service.rollback_deployment(id).await?;
            db_pool.close().await;
            println!("Deployment {} rollback initiated: status={}", deployment.id, deployment.status);
        }
        Commands::ResetOrphaned { deployment_id } => {
            let id = parse_uuid(&deployment_id, "deployment ID")?;
            let resolved = OrchestratorConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let tasks = PostgresTaskRepository::new(db_pool.clone());

            let reset = tasks.reset_orphaned(id).await?;
            db_pool.close().await;
            println!("Reset {} orphaned task(s)", reset.len());
            for task in &reset {
                println!("  {} {} -> {}", task.id, task.name, task.status);
            }
        }
    }

    Ok(())
}
