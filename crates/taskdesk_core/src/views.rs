//! Read-side selections over a task snapshot.

use crate::model::{Category, CategoryId, Task};
use std::collections::HashMap;
use std::sync::Arc;
use time::Date;

fn by_due<'a>(tasks: impl Iterator<Item = &'a Arc<Task>>) -> Vec<Arc<Task>> {
    let mut selected: Vec<Arc<Task>> = tasks.cloned().collect();
    selected.sort_by_key(|task| (task.due_date, task.due_time.is_none(), task.due_time));
    selected
}

/// Every task due on `date`, finished or not, in collection order.
pub fn due_on(tasks: &[Arc<Task>], date: Date) -> Vec<Arc<Task>> {
    tasks
        .iter()
        .filter(|task| task.due_date == date)
        .cloned()
        .collect()
}

/// Pending tasks due today or earlier, oldest first.
pub fn overdue_or_today(tasks: &[Arc<Task>], today: Date) -> Vec<Arc<Task>> {
    by_due(
        tasks
            .iter()
            .filter(|task| !task.is_finished() && task.due_date <= today),
    )
}

/// The next `limit` pending tasks due after `today`.
pub fn upcoming(tasks: &[Arc<Task>], today: Date, limit: usize) -> Vec<Arc<Task>> {
    let mut selected = by_due(
        tasks
            .iter()
            .filter(|task| !task.is_finished() && task.due_date > today),
    );
    selected.truncate(limit);
    selected
}

/// Resolves category ids against one categories snapshot. Ids that are not
/// in the snapshot resolve to [`Category::unknown`].
#[derive(Debug, Clone, Default)]
pub struct CategoryLookup {
    by_id: HashMap<CategoryId, Arc<Category>>,
}

impl CategoryLookup {
    pub fn new(categories: &[Arc<Category>]) -> Self {
        Self {
            by_id: categories
                .iter()
                .map(|category| (category.id.clone(), Arc::clone(category)))
                .collect(),
        }
    }

    pub fn resolve(&self, id: &CategoryId) -> Arc<Category> {
        self.by_id
            .get(id)
            .cloned()
            .unwrap_or_else(|| Arc::new(Category::unknown(id.clone())))
    }
}
