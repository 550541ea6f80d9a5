mod cli;

use clap::Parser;
use clap::error::ErrorKind;
use cli::{Cli, Command, TaskFields, normalize_parse_error, required_title};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use taskdesk_core::clock::{Clock, SystemClock};
use taskdesk_core::config::{self, ConfigOverrides, Palette, merge_overrides, palette_for_theme};
use taskdesk_core::error::{AppError, AppResult};
use taskdesk_core::gateway::Gateway;
use taskdesk_core::model::{
    Category, CategoryId, PROFILE_IMAGE_KEY, Profile, ProfileImage, Reminder, Task, TaskId, TaskInput, TaskStatus,
};
use taskdesk_core::notify::{activation_argument, notifier_from_env};
use taskdesk_core::session::{Session, SessionOptions};
use taskdesk_core::storage::JsonFileGateway;
use taskdesk_core::views::{self, CategoryLookup};
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

struct Output {
    json: bool,
    palette: Palette,
}

fn status_label(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::Finished => "finished",
    }
}

#[derive(Tabled)]
struct TaskRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Status")]
    status: &'static str,
    #[tabled(rename = "Due")]
    due: String,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Reminder")]
    reminder: String,
}

#[derive(Tabled)]
struct CategoryRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Color")]
    color: String,
}

fn due_label(task: &Task) -> String {
    match task.due_time {
        Some(at) => format!("{} {:02}:{:02}", task.due_date, at.hour(), at.minute()),
        None => task.due_date.to_string(),
    }
}

fn task_json(task: &Task, category: &Category) -> AppResult<serde_json::Value> {
    let mut value = serde_json::to_value(task)?;
    if let Some(object) = value.as_object_mut() {
        object.insert("category".into(), serde_json::json!(category.name));
    }
    Ok(value)
}

fn print_tasks(out: &Output, tasks: &[Arc<Task>], lookup: &CategoryLookup) -> AppResult<()> {
    if out.json {
        let payload = tasks
            .iter()
            .map(|task| task_json(task, &lookup.resolve(&task.category_id)))
            .collect::<AppResult<Vec<_>>>()?;
        println!("{}", serde_json::Value::Array(payload));
        return Ok(());
    }

    if tasks.is_empty() {
        println!("{}", out.palette.mutedize("No tasks."));
        return Ok(());
    }

    let rows = tasks.iter().map(|task| TaskRow {
        id: task.id.to_string(),
        title: task.title.clone(),
        status: status_label(task.status),
        due: due_label(task),
        category: lookup.resolve(&task.category_id).name.clone(),
        reminder: task.reminder_time.clone().unwrap_or_else(|| "-".into()),
    });
    let mut table = Table::new(rows);
    table.with(Style::psql());
    println!("{table}");
    Ok(())
}

fn print_task(out: &Output, verb: &str, task: &Task, lookup: &CategoryLookup) -> AppResult<()> {
    if out.json {
        println!("{}", task_json(task, &lookup.resolve(&task.category_id))?);
    } else {
        println!("{}: {} ({})", out.palette.accentize(verb), task.title, task.id);
    }
    Ok(())
}

fn print_task_details(out: &Output, task: &Task, lookup: &CategoryLookup) -> AppResult<()> {
    if out.json {
        println!("{}", task_json(task, &lookup.resolve(&task.category_id))?);
        return Ok(());
    }

    let category = lookup.resolve(&task.category_id);
    println!("{}", out.palette.accentize(&task.title));
    println!("id: {}", task.id);
    println!("status: {}", status_label(task.status));
    println!("due: {}", due_label(task));
    println!("category: {} ({})", category.name, category.color);
    println!("reminder: {}", task.reminder_time.as_deref().unwrap_or("-"));
    println!("remarks: {}", task.remarks.as_deref().unwrap_or("-"));
    if let Some(completed_at) = task.completed_at {
        println!("completed: {completed_at}");
    }
    Ok(())
}

fn print_categories(out: &Output, categories: &[Arc<Category>]) -> AppResult<()> {
    if out.json {
        let plain: Vec<&Category> = categories.iter().map(Arc::as_ref).collect();
        println!("{}", serde_json::to_value(plain)?);
        return Ok(());
    }
    if categories.is_empty() {
        println!("{}", out.palette.mutedize("No categories."));
        return Ok(());
    }
    let rows = categories.iter().map(|category| CategoryRow {
        id: category.id.to_string(),
        name: category.name.clone(),
        color: category.color.clone(),
    });
    let mut table = Table::new(rows);
    table.with(Style::psql());
    println!("{table}");
    Ok(())
}

fn print_profile(out: &Output, profile: &Profile, image: Option<&ProfileImage>) -> AppResult<()> {
    if out.json {
        let mut value = serde_json::to_value(profile)?;
        if let Some(fields) = value.as_object_mut() {
            fields.insert("image".into(), serde_json::to_value(image)?);
        }
        println!("{value}");
        return Ok(());
    }
    let name = profile.display_name();
    println!(
        "{}",
        out.palette
            .accentize(if name.is_empty() { "(no name)" } else { &name })
    );
    println!("email: {}", profile.email);
    println!("mobile: {}", profile.mobile);
    println!("address: {}", profile.address);
    println!("theme: {}", profile.theme.as_str());
    println!("image: {}", image.map_or("none", |_| "set"));
    Ok(())
}

fn print_reminder(out: &Output, reminder: &Reminder) -> AppResult<()> {
    if out.json {
        println!("{}", serde_json::to_value(reminder)?);
    } else {
        println!("{}", out.palette.accentize(&reminder.message));
    }
    Ok(())
}

fn find_task(session: &Session, id: &str) -> AppResult<Arc<Task>> {
    let id = TaskId::new(id);
    session
        .use_tasks()
        .items
        .iter()
        .find(|task| task.id == id)
        .cloned()
        .ok_or_else(|| AppError::not_found(format!("task {id} not found")))
}

fn category_lookup(session: &Session) -> CategoryLookup {
    CategoryLookup::new(&session.use_categories().items)
}

fn apply_fields(task: &mut Task, fields: TaskFields) {
    if let Some(due) = fields.due {
        task.due_date = due;
    }
    if let Some(at) = fields.time {
        task.due_time = Some(at);
    }
    if let Some(reminder) = fields.reminder {
        task.reminder_time = Some(reminder);
    }
    if let Some(category) = fields.category {
        task.category_id = CategoryId::new(category);
    }
    if let Some(remarks) = fields.remarks {
        task.remarks = Some(remarks).filter(|text| !text.trim().is_empty());
    }
}

fn open_session(config: &config::Config) -> AppResult<Session> {
    let store = config::store_path()?;
    let snapshot = if config.snapshot {
        Some(config::snapshot_path()?)
    } else {
        None
    };
    tracing::debug!(store = %store.display(), "opening task store");

    let gateway: Arc<dyn Gateway> = Arc::new(JsonFileGateway::new(store));
    Ok(Session::new(
        gateway,
        SessionOptions::from_config(config, snapshot),
        Arc::new(SystemClock),
    ))
}

async fn watch(session: &Session, out: &Output, refresh_every: Duration) -> AppResult<()> {
    let notifier = notifier_from_env()?;
    let (sender, mut receiver) = mpsc::unbounded_channel::<Vec<Reminder>>();
    let _subscription = session.subscribe_reminders(move |active| {
        let _ = sender.send(active.clone());
    });
    session.start();

    let mut refresh = tokio::time::interval(refresh_every);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut shown: HashSet<(TaskId, OffsetDateTime)> = HashSet::new();

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = refresh.tick() => {
                session.use_tasks();
            }
            Some(active) = receiver.recv() => {
                for reminder in &active {
                    if !shown.insert((reminder.task_id.clone(), reminder.fired_at)) {
                        continue;
                    }
                    print_reminder(out, reminder)?;
                    let action = activation_argument(reminder.task_id.as_str());
                    if let Err(err) = notifier.notify_with_action(reminder, &action) {
                        tracing::warn!(task_id = %reminder.task_id, error = %err, "failed to show notification");
                    }
                }
                shown.retain(|(task_id, fired_at)| {
                    active
                        .iter()
                        .any(|reminder| &reminder.task_id == task_id && &reminder.fired_at == fired_at)
                });
            }
        }
    }

    tracing::info!("watch interrupted, shutting down");
    Ok(())
}

async fn run_command(cli: Cli) -> AppResult<()> {
    let loaded = config::load_config_with_fallback();
    if let Some(err) = &loaded.error {
        tracing::warn!(error = %err, "ignoring unreadable config");
    }
    let overrides = ConfigOverrides::parse(&cli.config_override)?;
    let config = merge_overrides(&loaded.config, &overrides)?;

    // Fail on a blank title before anything is loaded.
    let command = match cli.command {
        Command::Add { title, fields } => Command::Add {
            title: Some(required_title(title)?),
            fields,
        },
        other => other,
    };

    let session = open_session(&config)?;
    session.load().await?;

    let profile_theme = session
        .use_profile()
        .first()
        .map(|profile| profile.theme.as_str());
    let out = Output {
        json: cli.json,
        palette: palette_for_theme(config.theme.as_deref().or(profile_theme)),
    };
    let today = SystemClock.now().date();

    match command {
        Command::Add { title, fields } => {
            let mut input = TaskInput {
                title: title.unwrap_or_default(),
                due_date: fields.due,
                due_time: fields.time,
                reminder_time: fields.reminder,
                remarks: fields.remarks,
                ..TaskInput::default()
            };
            if let Some(category) = fields.category {
                input.category_id = CategoryId::new(category);
            }
            let task = session.submit_task_create(input).await?;
            print_task(&out, "Added task", &task, &category_lookup(&session))?;
        }
        Command::Edit {
            id,
            title,
            fields,
            clear_reminder,
        } => {
            let mut task = (*find_task(&session, &id)?).clone();
            if let Some(title) = title {
                task.title = title;
            }
            apply_fields(&mut task, fields);
            if clear_reminder {
                task.reminder_time = None;
            }
            let task = session.submit_task_update(task).await?;
            print_task(&out, "Updated task", &task, &category_lookup(&session))?;
        }
        Command::Done { id } => {
            let task = session.coordinator().finish(&TaskId::new(&id)).await?;
            print_task(&out, "Finished task", &task, &category_lookup(&session))?;
        }
        Command::Reopen { id } => {
            let task = session.coordinator().reopen(&TaskId::new(&id)).await?;
            print_task(&out, "Reopened task", &task, &category_lookup(&session))?;
        }
        Command::Delete { id } => {
            let task = find_task(&session, &id)?;
            session.submit_task_delete(&task.id).await?;
            print_task(&out, "Deleted task", &task, &category_lookup(&session))?;
        }
        Command::Show { id } => {
            let task = find_task(&session, &id)?;
            print_task_details(&out, &task, &category_lookup(&session))?;
        }
        Command::List { date } => {
            let tasks = session.use_tasks().items;
            let selected = match date {
                Some(date) => views::due_on(&tasks, date),
                None => tasks.to_vec(),
            };
            print_tasks(&out, &selected, &category_lookup(&session))?;
        }
        Command::Today => {
            let tasks = views::overdue_or_today(&session.use_tasks().items, today);
            print_tasks(&out, &tasks, &category_lookup(&session))?;
        }
        Command::Upcoming { limit } => {
            let tasks = views::upcoming(&session.use_tasks().items, today, limit);
            print_tasks(&out, &tasks, &category_lookup(&session))?;
        }
        Command::Categories => {
            print_categories(&out, &session.use_categories().items)?;
        }
        Command::Profile {
            theme,
            first_name,
            last_name,
            email,
            mobile,
            address,
            image,
            clear_image,
        } => {
            let current = session
                .use_profile()
                .first()
                .map(|profile| (**profile).clone())
                .unwrap_or_default();
            let mut next = current.clone();
            if let Some(theme) = theme {
                next.theme = theme;
            }
            for (field, value) in [
                (&mut next.first_name, first_name),
                (&mut next.last_name, last_name),
                (&mut next.email, email),
                (&mut next.mobile, mobile),
                (&mut next.address, address),
            ] {
                if let Some(value) = value {
                    *field = value.trim().to_string();
                }
            }

            let shown = if next == current {
                current
            } else {
                session.coordinator().save_profile(next).await?
            };

            let current_image = session
                .cache()
                .profile_image()
                .find(PROFILE_IMAGE_KEY)
                .map(|image| (*image).clone());
            let shown_image = match (image, clear_image) {
                (Some(source), _) => Some(
                    session
                        .coordinator()
                        .save_profile_image(ProfileImage::new(source.trim()))
                        .await?,
                ),
                (None, true) => {
                    if current_image.is_some() {
                        session.coordinator().delete_profile_image().await?;
                    }
                    None
                }
                (None, false) => current_image,
            };
            print_profile(&out, &shown, shown_image.as_ref())?;
        }
        Command::Watch => {
            let refresh_every = Duration::from_secs(config.staleness.tasks_secs.max(1));
            watch(&session, &out, refresh_every).await?;
        }
    }

    session.teardown();
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_tracing();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err)
            if matches!(
                err.kind(),
                ErrorKind::DisplayHelp
                    | ErrorKind::DisplayVersion
                    | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
            ) =>
        {
            err.exit()
        }
        Err(err) => {
            eprintln!("ERROR: {}", normalize_parse_error(&err));
            std::process::exit(1);
        }
    };

    if let Err(err) = run_command(cli).await {
        eprintln!("ERROR: {err}");
        std::process::exit(1);
    }
}
