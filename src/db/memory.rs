//! In-process `Repository` backing unit and end-to-end tests.
//!
//! One mutex guards both collections, so every method is a serializable
//! transaction and the unique/foreign-key rules are checked under the lock
//! exactly where Postgres would check its indexes.

use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::Repository;
use crate::{
    auth::repo_types::{NewUser, ProfileChanges, User},
    error::AppError,
    tasks::repo_types::{NewTask, Task, TaskPatch, TaskStatus},
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    tasks: HashMap<Uuid, Task>,
}

impl Tables {
    fn check_unique(&self, id: Uuid, username: &str, email: &str) -> Result<(), AppError> {
        for other in self.users.values().filter(|u| u.id != id) {
            if other.username == username {
                return Err(AppError::UsernameTaken);
            }
            if other.email == email {
                return Err(AppError::EmailTaken);
            }
        }
        Ok(())
    }

    fn owned_task(&mut self, owner_id: Uuid, id: Uuid) -> Option<&mut Task> {
        self.tasks.get_mut(&id).filter(|t| t.owner_id == owner_id)
    }
}

#[derive(Default)]
pub struct MemoryRepository {
    tables: Mutex<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let t = self.tables.lock().await;
        Ok(t.users.values().find(|u| u.username == username).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let t = self.tables.lock().await;
        Ok(t.users.values().find(|u| u.email == email).cloned())
    }

    async fn insert_user(&self, new: NewUser) -> Result<User, AppError> {
        let mut t = self.tables.lock().await;
        let id = Uuid::new_v4();
        t.check_unique(id, &new.username, &new.email)?;
        let now = OffsetDateTime::now_utc();
        let user = User {
            id,
            username: new.username,
            email: new.email,
            password_hash: new.password_hash,
            first_name: new.first_name,
            last_name: new.last_name,
            active: new.active,
            created_at: now,
            updated_at: now,
        };
        t.users.insert(id, user.clone());
        Ok(user)
    }

    async fn update_user(
        &self,
        id: Uuid,
        changes: ProfileChanges,
    ) -> Result<Option<User>, AppError> {
        let mut t = self.tables.lock().await;
        let Some(mut user) = t.users.get(&id).cloned() else {
            return Ok(None);
        };
        if !user.apply(&changes) {
            return Ok(Some(user));
        }
        t.check_unique(id, &user.username, &user.email)?;
        user.updated_at = OffsetDateTime::now_utc();
        t.users.insert(id, user.clone());
        Ok(Some(user))
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, AppError> {
        let mut t = self.tables.lock().await;
        t.tasks.retain(|_, task| task.owner_id != id);
        Ok(t.users.remove(&id).is_some())
    }

    async fn find_task(&self, owner_id: Uuid, id: Uuid) -> Result<Option<Task>, AppError> {
        let mut t = self.tables.lock().await;
        Ok(t.owned_task(owner_id, id).cloned())
    }

    async fn list_tasks_by_owner(&self, owner_id: Uuid) -> Result<Vec<Task>, AppError> {
        let t = self.tables.lock().await;
        Ok(t.tasks
            .values()
            .filter(|task| task.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn insert_task(&self, new: NewTask) -> Result<Task, AppError> {
        let mut t = self.tables.lock().await;
        if !t.users.contains_key(&new.owner_id) {
            return Err(AppError::Unauthenticated);
        }
        let task = Task {
            id: Uuid::new_v4(),
            title: new.title,
            description: new.description,
            duration: new.duration,
            status: new.status,
            priority: new.priority,
            due_date: new.due_date,
            created_at: OffsetDateTime::now_utc(),
            owner_id: new.owner_id,
        };
        t.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn update_task(
        &self,
        owner_id: Uuid,
        id: Uuid,
        patch: TaskPatch,
    ) -> Result<Option<Task>, AppError> {
        let mut t = self.tables.lock().await;
        Ok(t.owned_task(owner_id, id).map(|task| {
            task.apply(&patch);
            task.clone()
        }))
    }

    async fn set_task_status(
        &self,
        owner_id: Uuid,
        id: Uuid,
        status: TaskStatus,
    ) -> Result<Option<(Task, bool)>, AppError> {
        let mut t = self.tables.lock().await;
        Ok(t.owned_task(owner_id, id).map(|task| {
            let changed = task.status != status;
            task.status = status;
            (task.clone(), changed)
        }))
    }

    async fn delete_task(&self, owner_id: Uuid, id: Uuid) -> Result<bool, AppError> {
        let mut t = self.tables.lock().await;
        if t.owned_task(owner_id, id).is_none() {
            return Ok(false);
        }
        Ok(t.tasks.remove(&id).is_some())
    }

    async fn delete_task_by_id(&self, id: Uuid) -> Result<bool, AppError> {
        Ok(self.tables.lock().await.tasks.remove(&id).is_some())
    }
}
