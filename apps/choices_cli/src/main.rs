use std::{collections::HashSet, fs, path::Path, path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    summary_bar::SummaryBarState, CartCollaborator, ChoiceStore, ChoiceStoreHandle,
    HttpCartClient, MissingCartCollaborator, SelectionDialog, SummaryAction,
    SummaryBarController, SummaryBarView,
};
use shared::{
    domain::{format_price, ChoiceLevel, EventId, SubjectCode, TutorialEventData},
    rules::{
        checkout_blocked, normalize_messages, sort_by_priority, RawRulesMessage, RulesMessage,
        Segment,
    },
};
use storage::{normalize_database_url, Storage};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, Settings, CONFIG_FILE};

#[derive(Parser, Debug)]
#[command(name = "choices", about = "Tutorial choices and their cart lines")]
struct Cli {
    #[arg(long, default_value = CONFIG_FILE)]
    config: PathBuf,
    #[arg(long)]
    database_url: Option<String>,
    #[arg(long)]
    cart_api_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every stored choice grouped by subject.
    List,
    /// Print the summary bar of every subject holding choices.
    Summary,
    /// List catalogue events for a subject with their assigned level.
    Events {
        subject: String,
        #[arg(long)]
        catalogue: PathBuf,
        #[arg(long)]
        location: Option<String>,
    },
    Select {
        subject: String,
        event_id: i64,
        /// One of 1st, 2nd, 3rd.
        level: String,
        #[arg(long)]
        catalogue: PathBuf,
    },
    Deselect {
        subject: String,
        event_id: i64,
    },
    RemoveLevel {
        subject: String,
        level: String,
    },
    ClearSubject {
        subject: String,
    },
    AddToCart {
        subject: String,
    },
    RemoveFromCart {
        subject: String,
    },
    /// Restore carted choices whose cart line has disappeared.
    Reconcile,
    Total,
    /// Print rules-engine messages from a JSON file in display order.
    Messages {
        file: PathBuf,
        #[arg(long = "ack")]
        acknowledged: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = load_settings(&cli.config)?;
    if let Some(v) = cli.database_url {
        settings.database_url = v;
    }
    if let Some(v) = cli.cart_api_url {
        settings.cart_api_url = Some(v);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let command = match cli.command {
        Command::Messages { file, acknowledged } => {
            return print_messages(&file, &acknowledged);
        }
        command => command,
    };

    let database_url = normalize_database_url(&settings.database_url);
    let storage = Storage::new(&database_url).await?;
    storage.health_check().await?;
    let storage = Arc::new(storage);
    let choices = ChoiceStoreHandle::load(storage).await?;
    let controller = SummaryBarController::new(choices, cart_collaborator(&settings)?);

    run(command, &controller).await
}

fn cart_collaborator(settings: &Settings) -> Result<Arc<dyn CartCollaborator>> {
    match settings.cart_api_url.as_deref() {
        Some(url) => {
            info!(cart_api_url = %url, "choices: using http cart");
            Ok(Arc::new(HttpCartClient::new(url)?))
        }
        None => {
            warn!("choices: no cart api configured, cart commands will fail");
            Ok(Arc::new(MissingCartCollaborator))
        }
    }
}

async fn run(command: Command, controller: &SummaryBarController) -> Result<()> {
    let choices = controller.choices();

    match command {
        Command::List => {
            let store = choices.snapshot().await;
            for line in describe_choices(&store) {
                println!("{line}");
            }
        }
        Command::Summary => {
            for view in controller.views().await {
                for line in describe_view(&view) {
                    println!("{line}");
                }
            }
        }
        Command::Events {
            subject,
            catalogue,
            location,
        } => {
            let mut dialog = dialog_for(read_catalogue(&catalogue)?, &SubjectCode::from(subject))?;
            if let Some(location) = location {
                dialog = dialog.for_location(location);
            }
            let store = choices.snapshot().await;
            for row in dialog.rows(&store) {
                let level = row
                    .assigned_level
                    .map(|level| level.to_string())
                    .unwrap_or_else(|| "-".into());
                println!(
                    "{:>6}  {:<3}  {}  {}",
                    row.event.event_id, level, row.event.location, row.event.event_title
                );
            }
        }
        Command::Select {
            subject,
            event_id,
            level,
            catalogue,
        } => {
            let dialog = dialog_for(read_catalogue(&catalogue)?, &SubjectCode::from(subject))?;
            dialog.select_str(choices, EventId(event_id), &level).await?;
            println!(
                "selected event_id={event_id} as {level} for {}",
                dialog.subject_code()
            );
        }
        Command::Deselect { subject, event_id } => {
            let dialog = SelectionDialog::new(SubjectCode::from(subject), "", Vec::new());
            if dialog.deselect(choices, EventId(event_id)).await? {
                println!("deselected event_id={event_id}");
            } else {
                println!("event_id={event_id} was not selected");
            }
        }
        Command::RemoveLevel { subject, level } => {
            let level: ChoiceLevel = level.parse()?;
            let subject = SubjectCode::from(subject);
            choices.remove_tutorial_choice(&subject, level).await?;
            println!("removed {level} choice for {subject}");
        }
        Command::ClearSubject { subject } => {
            let subject = SubjectCode::from(subject);
            choices.remove_subject_choices(&subject).await?;
            println!("cleared choices for {subject}");
        }
        Command::AddToCart { subject } => {
            let subject = SubjectCode::from(subject);
            controller.add_to_cart(&subject).await?;
            println!("added {subject} tutorial choices to cart");
        }
        Command::RemoveFromCart { subject } => {
            let subject = SubjectCode::from(subject);
            controller.remove(&subject).await?;
            println!("removed {subject} tutorial choices");
        }
        Command::Reconcile => {
            let restored = controller.refresh_from_cart().await?;
            if restored.is_empty() {
                println!("cart and choices agree");
            }
            for subject in restored {
                println!("restored {subject} to draft");
            }
        }
        Command::Total => {
            let total = choices.read(ChoiceStore::total_price).await;
            println!("{}", format_price(total));
        }
        Command::Messages { file, acknowledged } => print_messages(&file, &acknowledged)?,
    }

    Ok(())
}

fn read_catalogue(path: &Path) -> Result<Vec<TutorialEventData>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read catalogue '{}'", path.display()))?;
    parse_catalogue(&raw).with_context(|| format!("invalid catalogue '{}'", path.display()))
}

fn parse_catalogue(raw: &str) -> Result<Vec<TutorialEventData>> {
    Ok(serde_json::from_str(raw)?)
}

fn dialog_for(events: Vec<TutorialEventData>, subject: &SubjectCode) -> Result<SelectionDialog> {
    let events: Vec<TutorialEventData> = events
        .into_iter()
        .filter(|event| &event.subject_code == subject)
        .collect();
    let Some(subject_name) = events.first().map(|event| event.subject_name.clone()) else {
        bail!("catalogue has no tutorial events for subject {subject}");
    };
    Ok(SelectionDialog::new(subject.clone(), subject_name, events))
}

fn describe_choices(store: &ChoiceStore) -> Vec<String> {
    let mut lines = Vec::new();
    for subject in store.subjects() {
        lines.push(subject.to_string());
        for choice in store.choices(subject) {
            let status = if choice.is_draft { "draft" } else { "in cart" };
            lines.push(format!(
                "  {}  event_id={}  {}  ({status})",
                choice.choice_level,
                choice.event_id(),
                choice.event.location
            ));
        }
    }
    lines
}

fn describe_view(view: &SummaryBarView) -> Vec<String> {
    let state = match view.state {
        SummaryBarState::Hidden => "hidden",
        SummaryBarState::Collapsed => "collapsed",
        SummaryBarState::Expanded { .. } => "expanded",
    };
    let actions: Vec<&str> = view
        .actions
        .iter()
        .map(|action| match action {
            SummaryAction::Edit => "edit",
            SummaryAction::AddToCart => "add-to-cart",
            SummaryAction::Remove => "remove",
        })
        .collect();

    let mut lines = vec![format!(
        "{} {} [{state}] {} actions: {}",
        view.subject_code,
        view.subject_name,
        view.price.as_deref().unwrap_or("-"),
        actions.join(", ")
    )];
    if let SummaryBarState::Expanded { draft_lines } = &view.state {
        for line in draft_lines {
            let starts = line
                .start_date
                .map(|date| date.format("%Y-%m-%d").to_string())
                .unwrap_or_default();
            lines.push(format!(
                "  {}  {}  {}  {starts}",
                line.level, line.location, line.event_title
            ));
        }
    }
    lines
}

fn print_messages(path: &Path, acknowledged: &[String]) -> Result<()> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read messages '{}'", path.display()))?;
    let raw: Vec<RawRulesMessage> = serde_json::from_str(&raw)
        .with_context(|| format!("invalid messages '{}'", path.display()))?;
    let acknowledged: HashSet<String> = acknowledged.iter().cloned().collect();
    for line in describe_messages(normalize_messages(raw), &acknowledged) {
        println!("{line}");
    }
    Ok(())
}

fn describe_messages(mut messages: Vec<RulesMessage>, acknowledged: &HashSet<String>) -> Vec<String> {
    sort_by_priority(&mut messages);
    let mut lines: Vec<String> = messages
        .iter()
        .map(|message| {
            let title = message
                .title
                .as_deref()
                .map(|title| format!("{title}: "))
                .unwrap_or_default();
            format!(
                "[{:?}] {} {title}{}",
                message.kind,
                message.id,
                render_segments(&message.segments())
            )
        })
        .collect();
    if checkout_blocked(&messages, acknowledged) {
        lines.push("checkout blocked".into());
    }
    lines
}

fn render_segments(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|segment| match segment {
            Segment::Text(text) | Segment::Bold(text) | Segment::Italic(text) => text.clone(),
            Segment::Link { label, url } => format!("{label} <{url}>"),
            Segment::LineBreak => " / ".into(),
        })
        .collect()
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
