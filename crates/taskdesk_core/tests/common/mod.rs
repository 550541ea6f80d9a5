#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use taskdesk_core::cache::{CacheOptions, EntityCache};
use taskdesk_core::clock::AnchoredClock;
use taskdesk_core::error::{AppError, AppResult};
use taskdesk_core::gateway::Gateway;
use taskdesk_core::model::{Category, CategoryId, Profile, ProfileImage, Task, TaskId, TaskInput};
use time::OffsetDateTime;
use time::macros::{date, datetime};

pub const START: OffsetDateTime = datetime!(2025-12-20 09:00 UTC);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    FetchTasks,
    FetchProfile,
    FetchCategories,
    Create,
    Update,
    Delete,
    SaveProfile,
    FetchProfileImage,
    SaveProfileImage,
    DeleteProfileImage,
}

#[derive(Default)]
struct Script {
    tasks: Vec<Task>,
    profile: Profile,
    categories: Vec<Category>,
    profile_image: Option<ProfileImage>,
    failures: HashMap<Op, VecDeque<AppError>>,
    delays: HashMap<Op, VecDeque<Duration>>,
    panics: HashMap<Op, usize>,
    calls: Vec<(Op, String)>,
    next_id: u64,
}

/// An in-memory backend whose answers, failures and latencies are scripted
/// per operation.
#[derive(Default)]
pub struct FakeGateway {
    script: Mutex<Script>,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_tasks(tasks: Vec<Task>) -> Arc<Self> {
        let gateway = Self::new();
        gateway.set_tasks(tasks);
        gateway
    }

    pub fn set_tasks(&self, tasks: Vec<Task>) {
        self.script.lock().unwrap().tasks = tasks;
    }

    pub fn set_categories(&self, categories: Vec<Category>) {
        self.script.lock().unwrap().categories = categories;
    }

    pub fn set_profile_image(&self, image: Option<ProfileImage>) {
        self.script.lock().unwrap().profile_image = image;
    }

    pub fn stored_profile_image(&self) -> Option<ProfileImage> {
        self.script.lock().unwrap().profile_image.clone()
    }

    pub fn stored_tasks(&self) -> Vec<Task> {
        self.script.lock().unwrap().tasks.clone()
    }

    /// The next call of `op` fails with `err`.
    pub fn fail_next(&self, op: Op, err: AppError) {
        self.script
            .lock()
            .unwrap()
            .failures
            .entry(op)
            .or_default()
            .push_back(err);
    }

    /// The next call of `op` takes `delay` before answering.
    pub fn delay_next(&self, op: Op, delay: Duration) {
        self.script
            .lock()
            .unwrap()
            .delays
            .entry(op)
            .or_default()
            .push_back(delay);
    }

    /// The next call of `op` panics instead of answering.
    pub fn panic_next(&self, op: Op) {
        *self.script.lock().unwrap().panics.entry(op).or_default() += 1;
    }

    pub fn calls(&self, op: Op) -> usize {
        self.script
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(called, _)| *called == op)
            .count()
    }

    /// Details recorded for every call of `op`, in call order.
    pub fn call_log(&self, op: Op) -> Vec<String> {
        self.script
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(called, _)| *called == op)
            .map(|(_, detail)| detail.clone())
            .collect()
    }

    async fn enter(&self, op: Op, detail: String) -> AppResult<()> {
        let (delay, failure, panics) = {
            let mut script = self.script.lock().unwrap();
            script.calls.push((op, detail));
            let delay = script.delays.get_mut(&op).and_then(VecDeque::pop_front);
            let failure = script.failures.get_mut(&op).and_then(VecDeque::pop_front);
            let panics = match script.panics.get_mut(&op) {
                Some(left) if *left > 0 => {
                    *left -= 1;
                    true
                }
                _ => false,
            };
            (delay, failure, panics)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if panics {
            panic!("scripted panic in {op:?}");
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn fetch_tasks(&self) -> AppResult<Vec<Task>> {
        let tasks = self.stored_tasks();
        self.enter(Op::FetchTasks, String::new()).await?;
        Ok(tasks)
    }

    async fn fetch_profile(&self) -> AppResult<Profile> {
        let profile = self.script.lock().unwrap().profile.clone();
        self.enter(Op::FetchProfile, String::new()).await?;
        Ok(profile)
    }

    async fn fetch_categories(&self) -> AppResult<Vec<Category>> {
        let categories = self.script.lock().unwrap().categories.clone();
        self.enter(Op::FetchCategories, String::new()).await?;
        Ok(categories)
    }

    async fn create_task(&self, task: &Task) -> AppResult<Task> {
        self.enter(Op::Create, task.title.clone()).await?;
        let mut script = self.script.lock().unwrap();
        script.next_id += 1;
        let mut created = task.clone();
        created.id = TaskId::new(format!("srv-{}", script.next_id));
        script.tasks.push(created.clone());
        Ok(created)
    }

    async fn update_task(&self, task: &Task) -> AppResult<Task> {
        self.enter(Op::Update, task.title.clone()).await?;
        let mut script = self.script.lock().unwrap();
        match script.tasks.iter_mut().find(|stored| stored.id == task.id) {
            Some(stored) => *stored = task.clone(),
            None => script.tasks.push(task.clone()),
        }
        Ok(task.clone())
    }

    async fn delete_task(&self, id: &TaskId) -> AppResult<()> {
        self.enter(Op::Delete, id.to_string()).await?;
        self.script
            .lock()
            .unwrap()
            .tasks
            .retain(|stored| &stored.id != id);
        Ok(())
    }

    async fn save_profile(&self, profile: &Profile) -> AppResult<Profile> {
        self.enter(Op::SaveProfile, profile.first_name.clone()).await?;
        self.script.lock().unwrap().profile = profile.clone();
        Ok(profile.clone())
    }

    async fn fetch_profile_image(&self) -> AppResult<Option<ProfileImage>> {
        let image = self.stored_profile_image();
        self.enter(Op::FetchProfileImage, String::new()).await?;
        Ok(image)
    }

    async fn save_profile_image(&self, image: &ProfileImage) -> AppResult<ProfileImage> {
        self.enter(Op::SaveProfileImage, image.source.clone()).await?;
        self.set_profile_image(Some(image.clone()));
        Ok(image.clone())
    }

    async fn delete_profile_image(&self) -> AppResult<()> {
        self.enter(Op::DeleteProfileImage, String::new()).await?;
        self.set_profile_image(None);
        Ok(())
    }
}

pub fn task(id: &str, title: &str) -> Task {
    TaskInput::new(title, date!(2025 - 12 - 20))
        .into_task(TaskId::new(id), datetime!(2025-12-19 08:00 UTC))
        .unwrap()
}

pub fn task_with_reminder(id: &str, title: &str, reminder: &str) -> Task {
    let mut task = task(id, title);
    task.reminder_time = Some(reminder.to_string());
    task
}

pub fn category(id: &str, name: &str) -> Category {
    Category::new(CategoryId::new(id), name, "#0d6efd")
}

pub fn cache(gateway: &Arc<FakeGateway>) -> Arc<EntityCache> {
    let gateway: Arc<dyn Gateway> = gateway.clone();
    EntityCache::init(gateway, CacheOptions::default())
}

pub fn clock() -> Arc<AnchoredClock> {
    Arc::new(AnchoredClock::new(START))
}
