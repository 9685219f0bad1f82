use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sqlx::SqlitePool;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{info, warn};

use crate::db::repository;
use crate::enrollment::{
    self, Actor, CancellationOutcome, EnrollmentError, GradeOutcome, Missing, Policy,
    ValidationOutcome,
};
use crate::error::AppError;
use crate::models::{Class, Course, Grade, Registration, User};

type ClassKey = (String, String);

/// One async mutex per (course code, class id). An entry lives only while
/// someone holds or waits for it.
#[derive(Default)]
struct ClassLocks {
    locks: Mutex<HashMap<ClassKey, Arc<AsyncMutex<()>>>>,
}

impl ClassLocks {
    async fn acquire(&self, course_code: &str, class_id: &str) -> ClassGuard<'_> {
        let key = (course_code.to_string(), class_id.to_string());
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Waiters abandoned mid-acquire can leave an idle entry behind.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(key.clone()).or_default().clone()
        };
        ClassGuard {
            locks: self,
            key,
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

struct ClassGuard<'a> {
    locks: &'a ClassLocks,
    key: ClassKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ClassGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.key);
        }
    }
}

/// Runs enrollment transitions against the database.
///
/// Every transition reloads its snapshot under the class lock, so two
/// requests for the same class never interleave their check and write.
/// Transitions that rewrite user completions also hold `ledger`, always taken
/// after the class lock.
pub struct EnrollmentService {
    db: SqlitePool,
    policy: Policy,
    class_locks: ClassLocks,
    ledger: AsyncMutex<()>,
}

impl EnrollmentService {
    pub fn new(db: SqlitePool, policy: Policy) -> Self {
        Self {
            db,
            policy,
            class_locks: ClassLocks::default(),
            ledger: AsyncMutex::new(()),
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    async fn load_course(&self, code: &str) -> Result<Course, AppError> {
        repository::find_course(&self.db, code)
            .await?
            .ok_or_else(|| EnrollmentError::NotFound(Missing::Course(code.to_string())).into())
    }

    async fn load_user(&self, id: &str) -> Result<User, AppError> {
        repository::find_user(&self.db, id)
            .await?
            .ok_or_else(|| EnrollmentError::NotFound(Missing::User(id.to_string())).into())
    }

    /// Writes the class and the given users' completions in one transaction.
    async fn persist(&self, course: &Course, class_id: &str, users: &[&User]) -> Result<(), AppError> {
        let missing = || EnrollmentError::NotFound(Missing::Class(class_id.to_string()));
        let class = course.class(class_id).ok_or_else(missing)?;

        let mut tx = self.db.begin().await?;
        if !repository::save_class(&mut tx, &course.code, class).await? {
            // The course was deleted while the lock was held.
            return Err(missing().into());
        }
        for user in users {
            repository::save_completions(&mut tx, user).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn register(
        &self,
        actor: &Actor,
        course_code: &str,
        class_id: &str,
    ) -> Result<Registration, AppError> {
        let _class = self.class_locks.acquire(course_code, class_id).await;
        let _ledger = self.ledger.lock().await;

        let student = self.load_user(actor.student_id()?).await?;
        let mut course = self.load_course(course_code).await?;
        let registration = match enrollment::register(actor, &student, &mut course, class_id) {
            Ok(r) => r.clone(),
            Err(e) => {
                warn!(student = %student.id, course = course_code, class = class_id, "registration refused: {}", e);
                return Err(e.into());
            }
        };

        self.persist(&course, class_id, &[]).await?;
        info!(student = %student.id, course = course_code, class = class_id, "registration pending");
        Ok(registration)
    }

    pub async fn cancel_registration(
        &self,
        actor: &Actor,
        course_code: &str,
        class_id: &str,
    ) -> Result<Registration, AppError> {
        let _class = self.class_locks.acquire(course_code, class_id).await;

        let mut course = self.load_course(course_code).await?;
        let removed = enrollment::cancel_registration(actor, &mut course, class_id)?;

        self.persist(&course, class_id, &[]).await?;
        info!(student = %removed.student_id, course = course_code, class = class_id, "registration cancelled");
        Ok(removed)
    }

    pub async fn approve(
        &self,
        actor: &Actor,
        course_code: &str,
        class_id: &str,
        student_id: &str,
    ) -> Result<(), AppError> {
        let _class = self.class_locks.acquire(course_code, class_id).await;

        let mut course = self.load_course(course_code).await?;
        enrollment::approve(actor, &mut course, class_id, student_id)?;

        self.persist(&course, class_id, &[]).await?;
        info!(by = actor.id(), student = student_id, course = course_code, class = class_id, "registration approved");
        Ok(())
    }

    pub async fn validate_class(
        &self,
        actor: &Actor,
        course_code: &str,
        class_id: &str,
    ) -> Result<ValidationOutcome, AppError> {
        let _class = self.class_locks.acquire(course_code, class_id).await;

        let mut course = self.load_course(course_code).await?;
        let outcome = enrollment::validate_class(actor, &self.policy, &mut course, class_id)?;

        if outcome.newly_validated {
            self.persist(&course, class_id, &[]).await?;
            info!(
                course = course_code,
                class = class_id,
                approved = outcome.approved.len(),
                "class validated"
            );
        }
        Ok(outcome)
    }

    pub async fn cancel_class(
        &self,
        actor: &Actor,
        course_code: &str,
        class_id: &str,
    ) -> Result<CancellationOutcome, AppError> {
        let _class = self.class_locks.acquire(course_code, class_id).await;
        let _ledger = self.ledger.lock().await;

        let mut course = self.load_course(course_code).await?;
        let mut users = if self.policy.revoke_completions_on_cancel {
            repository::fetch_users(&self.db).await?
        } else {
            Vec::new()
        };
        let outcome = enrollment::cancel_class(actor, &self.policy, &mut course, class_id, &mut users)?;

        let revoked: Vec<&User> = users
            .iter()
            .filter(|u| outcome.revoked_completions.contains(&u.id))
            .collect();
        self.persist(&course, class_id, &revoked).await?;

        info!(
            course = course_code,
            class = class_id,
            removed = outcome.removed_registrations.len(),
            revoked = outcome.revoked_completions.len(),
            "class cancelled"
        );
        Ok(outcome)
    }

    pub async fn submit_grade(
        &self,
        actor: &Actor,
        course_code: &str,
        class_id: &str,
        student_id: &str,
        grade: Grade,
    ) -> Result<GradeOutcome, AppError> {
        let _class = self.class_locks.acquire(course_code, class_id).await;
        let _ledger = self.ledger.lock().await;

        let mut course = self.load_course(course_code).await?;
        let mut student = self.load_user(student_id).await?;
        let outcome = enrollment::submit_grade(actor, &mut course, class_id, &mut student, grade)?;

        if outcome.completion_recorded {
            self.persist(&course, class_id, &[&student]).await?;
        } else {
            self.persist(&course, class_id, &[]).await?;
        }

        info!(
            course = course_code,
            class = class_id,
            student = student_id,
            grade = %grade,
            grading_complete = outcome.grading_complete,
            "grade recorded"
        );
        Ok(outcome)
    }

    pub async fn assign_instructor(
        &self,
        actor: &Actor,
        course_code: &str,
        class_id: &str,
        instructor_id: &str,
    ) -> Result<Class, AppError> {
        let _class = self.class_locks.acquire(course_code, class_id).await;

        let mut course = self.load_course(course_code).await?;
        let instructor = self.load_user(instructor_id).await?;
        let previous = enrollment::assign_instructor(actor, &mut course, class_id, &instructor)?;

        self.persist(&course, class_id, &[]).await?;
        info!(
            course = course_code,
            class = class_id,
            from = %previous,
            to = %instructor.name,
            "instructor reassigned"
        );
        course
            .class(class_id)
            .cloned()
            .ok_or_else(|| EnrollmentError::NotFound(Missing::Class(class_id.to_string())).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test db");
        crate::db::MIGRATOR.run(&pool).await.expect("Failed to run migrations");
        pool
    }

    #[tokio::test]
    async fn test_class_lock_entry_removed_on_release() {
        let locks = ClassLocks::default();

        let guard = locks.acquire("CS101", "C1").await;
        assert_eq!(locks.len(), 1);
        drop(guard);
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_class_lock_kept_while_contended() {
        let locks = Arc::new(ClassLocks::default());
        let first = locks.acquire("CS101", "C1").await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _second = locks.acquire("CS101", "C1").await;
            })
        };
        tokio::task::yield_now().await;

        drop(first);
        assert_eq!(locks.len(), 1);
        waiter.await.unwrap();
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_unknown_classes_leave_no_lock_behind() {
        let service = EnrollmentService::new(setup_test_db().await, Policy::default());
        let student = Actor::Student {
            id: "s1".to_string(),
        };
        let admin = Actor::Admin {
            id: "a1".to_string(),
        };

        for i in 0..50 {
            let class_id = format!("X{}", i);
            assert!(service.register(&student, "NOPE", &class_id).await.is_err());
            assert!(service.validate_class(&admin, "NOPE", &class_id).await.is_err());
        }
        assert_eq!(service.class_locks.len(), 0);
    }
}
