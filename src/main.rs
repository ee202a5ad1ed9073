//! # Formbox — form submission inbox with async email notifications
//!
//! Usage:
//!   formbox serve                          # Run delivery worker + retry sweep
//!   formbox submit --form contact --data '{"from_name":"Ana",...}'
//!   formbox list-entries --form contact --search hola
//!   formbox resend-notification 7 --token <token>

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

use formbox_core::config::FormboxConfig;
use formbox_core::form::{FormRegistry, process_submission};
use formbox_core::notification::{Notification, Status};
use formbox_core::render::HtmlRenderer;
use formbox_core::signing::LinkSigner;
use formbox_dispatch::{Dispatcher, Worker, run_sweep};
use formbox_mail::SmtpMailer;
use formbox_store::{
    EntryQuery, EntrySort, EntryStore, NotificationQuery, NotificationStore, SortOrder,
};

#[derive(Parser)]
#[command(
    name = "formbox",
    version,
    about = "📮 Formbox — form submissions with async email notifications"
)]
struct Cli {
    /// Config file path (default: ~/.formbox/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the delivery service: queue worker plus periodic retry sweep
    Serve,
    /// Submit form data, store the entry and schedule its notifications
    Submit {
        /// Form slug
        #[arg(long)]
        form: String,
        /// Submission values as a JSON object
        #[arg(long)]
        data: String,
        /// Deliver synchronously instead of leaving delivery to `serve`
        #[arg(long)]
        now: bool,
    },
    /// Show one entry by id, or the most recent one
    GetEntry {
        id: Option<i64>,
        /// Show the most recently submitted entry
        #[arg(long)]
        latest: bool,
    },
    /// List entries with filters
    ListEntries {
        #[arg(long)]
        form: Option<String>,
        /// Only entries submitted after this date/time
        #[arg(long)]
        from: Option<String>,
        /// Only entries submitted before this date/time
        #[arg(long)]
        to: Option<String>,
        /// Substring search over submitted values
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value_t = 50)]
        per_page: u32,
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// Sort field: id, form or submitted_on
        #[arg(long, default_value = "id")]
        orderby: String,
        /// Sort direction: asc or desc
        #[arg(long, default_value = "desc")]
        order: String,
    },
    /// Show one notification with its status history
    GetNotification { id: i64 },
    /// List notifications with filters
    ListNotifications {
        #[arg(long)]
        entry_id: Option<i64>,
        /// Filter by current status: scheduled, send_error or send_success
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value_t = 25)]
        per_page: u32,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Deliver a notification again. Requires a signed token unless --force
    ResendNotification {
        id: i64,
        /// Signed resend token for this notification
        #[arg(long)]
        token: Option<String>,
        /// Skip token verification (local admin use)
        #[arg(long)]
        force: bool,
    },
    /// Notification counts per current status
    Counts,
}

struct App {
    config: FormboxConfig,
    entries: Arc<EntryStore>,
    notifications: Arc<NotificationStore>,
    registry: Arc<FormRegistry>,
}

impl App {
    fn open(config: FormboxConfig) -> Result<Self> {
        let db_path = shellexpand::tilde(&config.database.path).to_string();
        let db = formbox_store::open(Path::new(&db_path))
            .with_context(|| format!("Open database at {db_path}"))?;
        let registry = Arc::new(FormRegistry::from_definitions(config.forms.clone()));
        Ok(Self {
            config,
            entries: Arc::new(EntryStore::new(db.clone())),
            notifications: Arc::new(NotificationStore::new(db)),
            registry,
        })
    }

    fn worker(&self, mailer: Arc<dyn formbox_core::mailer::Mailer>) -> Arc<Worker> {
        Arc::new(Worker::new(
            self.entries.clone(),
            self.notifications.clone(),
            self.registry.clone(),
            mailer,
            Arc::new(HtmlRenderer),
            self.config.site.base_url.clone(),
        ))
    }

    fn signer(&self) -> LinkSigner {
        LinkSigner::new(&self.config.site.secret)
    }
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn notification_json(notification: &Notification) -> Value {
    let mut value = serde_json::to_value(notification).unwrap_or(Value::Null);
    if let Value::Object(map) = &mut value {
        map.insert(
            "status_label".into(),
            json!(Status::label(notification.last_status())),
        );
    }
    value
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "formbox=debug,formbox_dispatch=debug,formbox_store=debug,formbox_mail=debug"
    } else {
        "formbox=info,formbox_dispatch=info,formbox_mail=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => {
            let path = shellexpand::tilde(path).to_string();
            FormboxConfig::load_from(Path::new(&path))?
        }
        None => FormboxConfig::load()?,
    };
    let app = App::open(config)?;

    match cli.command {
        Command::Serve => serve(&app).await,
        Command::Submit { form, data, now } => submit(&app, &form, &data, now).await,
        Command::GetEntry { id, latest } => get_entry(&app, id, latest),
        Command::ListEntries {
            form,
            from,
            to,
            search,
            per_page,
            page,
            orderby,
            order,
        } => {
            let query = EntryQuery {
                form,
                from,
                to,
                search,
                per_page,
                page,
                orderby: EntrySort::parse(&orderby),
                order: SortOrder::parse(&order),
            };
            let (entries, total) = app.entries.find_by_query(&query, &app.registry)?;
            print_json(&json!({ "total": total, "entries": entries }))
        }
        Command::GetNotification { id } => {
            let Some(notification) = app.notifications.find_by_id(id)? else {
                bail!("Notification {id} not found");
            };
            print_json(&notification_json(&notification))
        }
        Command::ListNotifications {
            entry_id,
            status,
            per_page,
            page,
        } => {
            let query = NotificationQuery {
                entry_id,
                status: status.as_deref().and_then(Status::parse),
                per_page,
                page,
            };
            let (notifications, total) = app.notifications.find_by_query(&query)?;
            let items: Vec<Value> = notifications.iter().map(notification_json).collect();
            print_json(&json!({ "total": total, "notifications": items }))
        }
        Command::ResendNotification { id, token, force } => resend(&app, id, token, force).await,
        Command::Counts => {
            let counts = app.notifications.counts_by_status()?;
            print_json(&serde_json::to_value(counts)?)
        }
    }
}

/// Long-running delivery service: worker loop plus the retry sweep. The
/// sweep's first pass runs at startup, so entries submitted while the
/// service was down get delivered right away.
async fn serve(app: &App) -> Result<()> {
    if app.registry.is_empty() {
        tracing::warn!("⚠️  No forms configured; submissions will be rejected");
    }
    let mailer: Arc<dyn formbox_core::mailer::Mailer> =
        Arc::new(SmtpMailer::new(app.config.smtp.clone())?);
    let (dispatcher, rx) = Dispatcher::new(app.notifications.clone());
    let worker = app.worker(mailer);

    println!("📮 Formbox v{}", env!("CARGO_PKG_VERSION"));
    println!("   🗄️  Database: {}", app.config.database.path);
    println!("   📨 SMTP:     {}:{}", app.config.smtp.host, app.config.smtp.port);
    println!(
        "   🔁 Sweep:    every {}s",
        app.config.dispatch.sweep_interval_secs
    );
    println!("   📋 Forms:    {}", app.registry.len());
    println!();

    tokio::spawn(worker.run(rx, dispatcher.clone()));
    tokio::spawn(run_sweep(
        app.notifications.clone(),
        dispatcher,
        app.config.dispatch.sweep_interval_secs,
    ));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    Ok(())
}

/// Take a submission: sanitize and validate it, store the entry, create one
/// notification per recipient. Delivery happens inline with --now, otherwise
/// the notifications stay scheduled for the `serve` sweep.
async fn submit(app: &App, form_slug: &str, data: &str, now: bool) -> Result<()> {
    let input: Value = serde_json::from_str(data).context("Parse --data as JSON")?;
    let Value::Object(input) = input else {
        bail!("--data must be a JSON object");
    };

    let values = process_submission(&app.registry, form_slug, &input)?;
    let entry_id = app.entries.create(form_slug, &values, &Map::new())?;

    let form = app
        .registry
        .get(form_slug)
        .ok_or_else(|| anyhow::anyhow!("Unknown form: {form_slug}"))?;
    let signer = app.signer();

    let mut created = Vec::new();
    for email in form.notification_emails(&values) {
        let mut notification = Notification::new(form_slug, entry_id, &email);
        notification.register_status(Status::Scheduled);
        let notification = app.notifications.create(notification)?;
        created.push(notification);
    }
    tracing::info!(
        "Entry {entry_id} stored with {} notification(s)",
        created.len()
    );

    if now {
        let worker = app.worker(Arc::new(SmtpMailer::new(app.config.smtp.clone())?));
        for notification in &mut created {
            worker.deliver(notification).await?;
        }
    } else if !created.is_empty() {
        tracing::info!(
            "Delivery deferred to the service's next sweep (within {}s); pass --now to send inline",
            app.config.dispatch.sweep_interval_secs
        );
    }

    print_json(&submission_summary(
        entry_id,
        &created,
        &signer,
        &app.config.site.base_url,
        now,
    ))
}

/// Submission result as printed: the entry id, how delivery will happen, and
/// one record per created notification with its resend link.
fn submission_summary(
    entry_id: i64,
    created: &[Notification],
    signer: &LinkSigner,
    base_url: &str,
    delivered_now: bool,
) -> Value {
    let notifications: Vec<Value> = created
        .iter()
        .map(|n| {
            json!({
                "id": n.id,
                "email": n.email,
                "status": n.last_status(),
                "resend_url": signer.resend_url(base_url, n.id),
            })
        })
        .collect();
    json!({
        "entry_id": entry_id,
        "delivery": if delivered_now { "sent" } else { "scheduled_for_sweep" },
        "notifications": notifications,
    })
}

fn get_entry(app: &App, id: Option<i64>, latest: bool) -> Result<()> {
    let entry = match (id, latest) {
        (Some(id), _) => app.entries.find_by_id(id)?,
        (None, true) => {
            let query = EntryQuery {
                per_page: 1,
                ..Default::default()
            };
            let (mut entries, _) = app.entries.find_by_query(&query, &app.registry)?;
            entries.pop()
        }
        (None, false) => bail!("Provide an entry id or --latest"),
    };
    let Some(entry) = entry else {
        bail!("Entry not found");
    };
    print_json(&serde_json::to_value(entry)?)
}

/// Re-deliver a notification. The token binds the request to this
/// notification id; verification failure leaves the notification untouched.
async fn resend(app: &App, id: i64, token: Option<String>, force: bool) -> Result<()> {
    let Some(mut notification) = app.notifications.find_by_id(id)? else {
        bail!("Notification {id} not found");
    };
    if !force {
        let Some(token) = token else {
            bail!("A resend token is required (or pass --force)");
        };
        app.signer().verify_resend(id, &token)?;
    }

    app.notifications
        .update_status(&mut notification, Status::Scheduled)?;

    let worker = app.worker(Arc::new(SmtpMailer::new(app.config.smtp.clone())?));
    let delivered = worker.deliver(&mut notification).await?;

    print_json(&json!({
        "id": notification.id,
        "email": notification.email,
        "delivered": delivered,
        "status": notification.last_status(),
    }))
}
