//! Integration tests for the engine over the in-memory store.
//!
//! Tests: request → engine → unit of work → committed state → certificate hook
//!
//! Verifies:
//! - Purchases debit and enroll atomically, in a fixed check order
//! - Progress is always derived from the course's current modules
//! - Completion is idempotent and issues a certificate exactly at 100%
//! - Reorders are all-or-nothing and scoped to one course

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    use lectern_accounts::{NewUser, ProfileUpdate};
    use lectern_auth::Principal;
    use lectern_catalog::{CourseUpdate, ModuleOrder, ModuleUpdate, NewCourse, NewModule, ReorderPolicy};
    use lectern_core::{CourseId, ModuleId, PageRequest, UserId};
    use lectern_learning::{CertificateRef, CourseCompleted};

    use crate::certificates::{CertificateError, CertificateIssuer};
    use crate::engine::{EngineSettings, EnrollmentEngine, ErrorKind};
    use crate::store::{FailPoint, InMemoryLearningStore, LearningStore, UnitOfWork};

    #[derive(Debug, Default)]
    struct RecordingIssuer {
        issued: Mutex<Vec<CourseCompleted>>,
        fail: AtomicBool,
    }

    impl RecordingIssuer {
        fn count(&self) -> usize {
            self.issued.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl CertificateIssuer for RecordingIssuer {
        async fn issue(&self, completion: &CourseCompleted) -> Result<CertificateRef, CertificateError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(CertificateError::Rejected("disk full".to_string()));
            }
            self.issued.lock().unwrap().push(completion.clone());
            Ok(CertificateRef::new(format!("/certs/{}.txt", completion.course_id)))
        }
    }

    type TestEngine = EnrollmentEngine<InMemoryLearningStore, Arc<RecordingIssuer>>;

    struct Fixture {
        engine: TestEngine,
        store: InMemoryLearningStore,
        issuer: Arc<RecordingIssuer>,
        admin: Principal,
    }

    async fn setup_with(settings: EngineSettings) -> Fixture {
        let store = InMemoryLearningStore::new();
        let issuer = Arc::new(RecordingIssuer::default());
        let engine = EnrollmentEngine::with_settings(store.clone(), issuer.clone(), settings);
        let (admin, created) = engine.ensure_admin("admin", "admin@example.com").await.unwrap();
        assert!(created);
        Fixture {
            engine,
            store,
            issuer,
            admin: Principal::admin(admin.id),
        }
    }

    async fn setup() -> Fixture {
        setup_with(EngineSettings::default()).await
    }

    impl Fixture {
        async fn learner(&self, name: &str, balance: i64) -> Principal {
            let user = self
                .engine
                .register_user(NewUser {
                    username: name.to_string(),
                    email: format!("{name}@example.com"),
                    first_name: name.to_string(),
                    last_name: "Learner".to_string(),
                })
                .await
                .unwrap();
            if balance > 0 {
                self.engine
                    .adjust_balance(&self.admin, user.id, Decimal::from(balance))
                    .await
                    .unwrap();
            }
            Principal::user(user.id)
        }

        async fn course(&self, title: &str, price: i64, modules: usize) -> (CourseId, Vec<ModuleId>) {
            let course = self
                .engine
                .create_course(
                    &self.admin,
                    NewCourse {
                        title: title.to_string(),
                        description: format!("All about {title}"),
                        instructor: "Grace Hopper".to_string(),
                        topics: vec![title.to_lowercase(), "programming".to_string()],
                        price: Decimal::from(price),
                        thumbnail_image: None,
                    },
                )
                .await
                .unwrap();

            let mut ids = Vec::with_capacity(modules);
            for n in 1..=modules {
                let module = self
                    .engine
                    .create_module(
                        &self.admin,
                        course.id,
                        NewModule {
                            title: format!("{title} {n}"),
                            description: String::new(),
                            pdf_content: None,
                            video_content: Some(format!("/videos/{n}.mp4")),
                        },
                    )
                    .await
                    .unwrap();
                ids.push(module.id);
            }
            (course.id, ids)
        }

        async fn balance(&self, user_id: UserId) -> Decimal {
            self.engine
                .user_detail(&self.admin, user_id)
                .await
                .unwrap()
                .user
                .balance
                .amount()
        }

        async fn enrolled(&self, user_id: UserId, course_id: CourseId) -> bool {
            let mut uow = self.store.begin().await.unwrap();
            uow.find_enrollment(user_id, course_id).await.unwrap().is_some()
        }
    }

    #[tokio::test]
    async fn course_without_modules_has_zero_progress() {
        let fx = setup().await;
        let ada = fx.learner("ada", 50).await;
        let (course, _) = fx.course("Empty", 10, 0).await;

        fx.engine.purchase(course, ada.user_id).await.unwrap();
        let progress = fx.engine.course_progress(ada.user_id, course).await.unwrap();

        assert_eq!(progress.total_modules, 0);
        assert_eq!(progress.percentage, 0.0);
        assert!(!progress.is_complete());
    }

    #[tokio::test]
    async fn purchase_with_exact_balance_leaves_zero() {
        let fx = setup().await;
        let ada = fx.learner("ada", 100).await;
        let (course, _) = fx.course("Rust", 100, 2).await;

        let receipt = fx.engine.purchase(course, ada.user_id).await.unwrap();

        assert_eq!(receipt.course_id, course);
        assert!(receipt.user_balance.is_zero());
        assert_eq!(fx.balance(ada.user_id).await, Decimal::ZERO);
        assert!(fx.enrolled(ada.user_id, course).await);
        assert!(fx.engine.can_access_course(&ada, course).await.unwrap());
    }

    #[tokio::test]
    async fn insufficient_balance_changes_nothing() {
        let fx = setup().await;
        let ada = fx.learner("ada", 99).await;
        let (course, _) = fx.course("Rust", 100, 1).await;

        let err = fx.engine.purchase(course, ada.user_id).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
        assert_eq!(err.to_string(), "insufficient balance");
        assert_eq!(fx.balance(ada.user_id).await, Decimal::from(99));
        assert!(!fx.enrolled(ada.user_id, course).await);
    }

    #[tokio::test]
    async fn second_purchase_conflicts_and_keeps_first() {
        let fx = setup().await;
        let ada = fx.learner("ada", 100).await;
        let (course, _) = fx.course("Rust", 30, 1).await;

        let first = fx.engine.purchase(course, ada.user_id).await.unwrap();
        let err = fx.engine.purchase(course, ada.user_id).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.to_string(), "course already purchased");
        assert_eq!(fx.balance(ada.user_id).await, Decimal::from(70));
        assert_eq!(first.user_balance.amount(), Decimal::from(70));

        let mine = fx
            .engine
            .my_courses(&ada, None, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(mine.pagination.total_items, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_duplicate_purchases_enroll_once() {
        let fx = setup().await;
        let ada = fx.learner("ada", 100).await;
        let (course, _) = fx.course("Rust", 30, 1).await;

        let (first, second) = tokio::join!(
            fx.engine.purchase(course, ada.user_id),
            fx.engine.purchase(course, ada.user_id),
        );
        let (ok, failed): (Vec<_>, Vec<_>) = [first, second].into_iter().partition(|r| r.is_ok());
        assert_eq!(ok.len(), 1);
        assert_eq!(failed.len(), 1);
        let err = failed.into_iter().next().unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        assert_eq!(fx.balance(ada.user_id).await, Decimal::from(70));
        let mine = fx
            .engine
            .my_courses(&ada, None, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(mine.pagination.total_items, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_purchases_cannot_overspend() {
        let fx = setup().await;
        let ada = fx.learner("ada", 100).await;
        let (rust, _) = fx.course("Rust", 60, 1).await;
        let (go, _) = fx.course("Go", 60, 1).await;

        let (first, second) = tokio::join!(
            fx.engine.purchase(rust, ada.user_id),
            fx.engine.purchase(go, ada.user_id),
        );
        let (ok, failed): (Vec<_>, Vec<_>) = [first, second].into_iter().partition(|r| r.is_ok());
        assert_eq!(ok.len(), 1);
        let err = failed.into_iter().next().unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
        assert_eq!(err.to_string(), "insufficient balance");

        assert_eq!(fx.balance(ada.user_id).await, Decimal::from(40));
        let mine = fx
            .engine
            .my_courses(&ada, None, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(mine.pagination.total_items, 1);
    }

    #[tokio::test]
    async fn purchase_checks_run_in_order() {
        let fx = setup().await;
        let ghost = UserId::new();
        let (course, _) = fx.course("Rust", 10, 1).await;

        // unknown course wins over unknown user
        let err = fx.engine.purchase(CourseId::new(), ghost).await.unwrap_err();
        assert_eq!(err.to_string(), "course not found");

        let err = fx.engine.purchase(course, ghost).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "user not found");

        // already purchased wins over insufficient funds
        let ada = fx.learner("ada", 10).await;
        fx.engine.purchase(course, ada.user_id).await.unwrap();
        let err = fx.engine.purchase(course, ada.user_id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn failed_enrollment_write_rolls_back_the_debit() {
        let fx = setup().await;
        let ada = fx.learner("ada", 100).await;
        let (course, _) = fx.course("Rust", 40, 1).await;

        fx.store.fail_on(FailPoint::InsertEnrollment);
        let err = fx.engine.purchase(course, ada.user_id).await.unwrap_err();
        fx.store.clear_failures();

        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(fx.balance(ada.user_id).await, Decimal::from(100));
        assert!(!fx.enrolled(ada.user_id, course).await);
    }

    #[tokio::test]
    async fn half_way_through_has_no_certificate() {
        let fx = setup().await;
        let ada = fx.learner("ada", 100).await;
        let (course, modules) = fx.course("Rust", 10, 4).await;
        fx.engine.purchase(course, ada.user_id).await.unwrap();

        fx.engine.complete_module(&ada, modules[0]).await.unwrap();
        let result = fx.engine.complete_module(&ada, modules[1]).await.unwrap();

        assert!(result.is_completed);
        assert_eq!(result.course_progress.percentage, 50.0);
        assert_eq!(result.course_progress.completed_modules, 2);
        assert!(result.certificate_url.is_none());
        assert_eq!(fx.issuer.count(), 0);
    }

    #[tokio::test]
    async fn finishing_a_course_issues_one_certificate() {
        let fx = setup().await;
        let ada = fx.learner("ada", 100).await;
        let (course, modules) = fx.course("Rust", 10, 1).await;
        fx.engine.purchase(course, ada.user_id).await.unwrap();

        let result = fx.engine.complete_module(&ada, modules[0]).await.unwrap();

        assert_eq!(result.course_progress.percentage, 100.0);
        assert_eq!(fx.issuer.count(), 1);
        let expected = format!("/certs/{course}.txt");
        assert_eq!(result.certificate_url.as_deref(), Some(expected.as_str()));

        let issued = fx.issuer.issued.lock().unwrap()[0].clone();
        assert_eq!(issued.username, "ada");
        assert_eq!(issued.course_title, "Rust");
        assert_eq!(issued.instructor, "Grace Hopper");
    }

    #[tokio::test]
    async fn completing_twice_is_idempotent() {
        let fx = setup().await;
        let ada = fx.learner("ada", 100).await;
        let (course, modules) = fx.course("Rust", 10, 3).await;
        fx.engine.purchase(course, ada.user_id).await.unwrap();

        let first = fx.engine.complete_module(&ada, modules[0]).await.unwrap();
        let completed_at = {
            let mut uow = fx.store.begin().await.unwrap();
            uow.find_progress(ada.user_id, modules[0]).await.unwrap().unwrap().completed_at
        };
        let second = fx.engine.complete_module(&ada, modules[0]).await.unwrap();

        assert!(second.is_completed);
        assert_eq!(first.course_progress, second.course_progress);

        let mut uow = fx.store.begin().await.unwrap();
        assert_eq!(uow.completed_module_ids(ada.user_id, course).await.unwrap().len(), 1);
        let row = uow.find_progress(ada.user_id, modules[0]).await.unwrap().unwrap();
        assert_eq!(row.completed_at, completed_at);
    }

    #[tokio::test]
    async fn completion_requires_purchase() {
        let fx = setup().await;
        let ada = fx.learner("ada", 100).await;
        let (_, modules) = fx.course("Rust", 10, 1).await;

        let err = fx.engine.complete_module(&ada, modules[0]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(err.to_string(), "access denied. Course not purchased");

        let err = fx.engine.complete_module(&ada, ModuleId::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "module not found");
    }

    #[tokio::test]
    async fn admins_bypass_the_purchase_gate() {
        let fx = setup().await;
        let (course, modules) = fx.course("Rust", 10, 2).await;

        let result = fx.engine.complete_module(&fx.admin, modules[0]).await.unwrap();
        assert_eq!(result.course_progress.percentage, 50.0);
        assert!(fx.engine.can_access_course(&fx.admin, course).await.unwrap());

        let view = fx.engine.module_detail(&fx.admin, modules[0]).await.unwrap();
        assert!(!view.is_completed);
    }

    #[tokio::test]
    async fn certificate_failure_keeps_progress() {
        let fx = setup().await;
        let ada = fx.learner("ada", 100).await;
        let (course, modules) = fx.course("Rust", 10, 1).await;
        fx.engine.purchase(course, ada.user_id).await.unwrap();
        fx.issuer.fail.store(true, Ordering::SeqCst);

        let result = fx.engine.complete_module(&ada, modules[0]).await.unwrap();

        assert!(result.certificate_url.is_none());
        assert_eq!(result.course_progress.percentage, 100.0);
        let progress = fx.engine.course_progress(ada.user_id, course).await.unwrap();
        assert!(progress.is_complete());
    }

    #[tokio::test]
    async fn failed_progress_write_leaves_no_row() {
        let fx = setup().await;
        let ada = fx.learner("ada", 100).await;
        let (course, modules) = fx.course("Rust", 10, 1).await;
        fx.engine.purchase(course, ada.user_id).await.unwrap();

        fx.store.fail_on(FailPoint::UpsertProgress);
        let err = fx.engine.complete_module(&ada, modules[0]).await.unwrap_err();
        fx.store.clear_failures();

        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(fx.issuer.count(), 0);
        let progress = fx.engine.course_progress(ada.user_id, course).await.unwrap();
        assert_eq!(progress.completed_modules, 0);
    }

    #[tokio::test]
    async fn reorder_swaps_and_ignores_foreign_modules() {
        let fx = setup().await;
        let (rust, rust_modules) = fx.course("Rust", 10, 2).await;
        let (_, go_modules) = fx.course("Go", 10, 1).await;
        let (m1, m2, foreign) = (rust_modules[0], rust_modules[1], go_modules[0]);

        let result = fx
            .engine
            .reorder_modules(
                &fx.admin,
                rust,
                vec![
                    ModuleOrder::new(m1, 2),
                    ModuleOrder::new(m2, 1),
                    ModuleOrder::new(foreign, 9),
                ],
            )
            .await
            .unwrap();
        assert_eq!(result.updated_modules, 2);

        let mut uow = fx.store.begin().await.unwrap();
        assert_eq!(uow.find_module(m1).await.unwrap().unwrap().order, 2);
        assert_eq!(uow.find_module(m2).await.unwrap().unwrap().order, 1);
        assert_eq!(uow.find_module(foreign).await.unwrap().unwrap().order, 1);
    }

    #[tokio::test]
    async fn reorder_is_all_or_nothing() {
        let fx = setup().await;
        let (rust, modules) = fx.course("Rust", 10, 2).await;

        fx.store.fail_on(FailPoint::SetModuleOrder);
        let err = fx
            .engine
            .reorder_modules(
                &fx.admin,
                rust,
                vec![ModuleOrder::new(modules[0], 2), ModuleOrder::new(modules[1], 1)],
            )
            .await
            .unwrap_err();
        fx.store.clear_failures();

        assert_eq!(err.kind(), ErrorKind::Internal);
        let mut uow = fx.store.begin().await.unwrap();
        assert_eq!(
            uow.module_orders(rust).await.unwrap(),
            vec![(modules[0], 1), (modules[1], 2)]
        );
    }

    #[tokio::test]
    async fn lenient_reorder_accepts_duplicates_strict_does_not() {
        let lenient = setup().await;
        let (course, modules) = lenient.course("Rust", 10, 2).await;
        lenient
            .engine
            .reorder_modules(&lenient.admin, course, vec![ModuleOrder::new(modules[1], 1)])
            .await
            .unwrap();

        let strict = setup_with(EngineSettings {
            reorder_policy: ReorderPolicy::Strict,
            ..EngineSettings::default()
        })
        .await;
        let (course, modules) = strict.course("Rust", 10, 2).await;

        // leaves two modules at position 1
        let err = strict
            .engine
            .reorder_modules(&strict.admin, course, vec![ModuleOrder::new(modules[1], 1)])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let mut uow = strict.store.begin().await.unwrap();
        assert_eq!(uow.find_module(modules[1]).await.unwrap().unwrap().order, 2);
    }

    #[tokio::test]
    async fn only_admins_manage_the_catalog() {
        let fx = setup().await;
        let ada = fx.learner("ada", 0).await;
        let (course, modules) = fx.course("Rust", 10, 1).await;

        let err = fx
            .engine
            .reorder_modules(&ada, course, vec![ModuleOrder::new(modules[0], 1)])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let err = fx.engine.delete_course(&ada, course).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        let err = fx.engine.admin_overview(&ada).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn updates_replace_course_and_module_fields() {
        let fx = setup().await;
        let ada = fx.learner("ada", 0).await;
        let (course, modules) = fx.course("Rust", 10, 1).await;

        let update = |title: &str, price: Decimal| CourseUpdate {
            title: title.to_string(),
            description: "Ownership and borrowing".to_string(),
            instructor: "Ada Lovelace".to_string(),
            topics: vec!["systems".to_string()],
            price,
            thumbnail_image: None,
        };

        let updated = fx
            .engine
            .update_course(&fx.admin, course, update("Rust in Depth", Decimal::new(2550, 2)))
            .await
            .unwrap();
        assert_eq!(updated.title, "Rust in Depth");
        let detail = fx.engine.course_detail(&ada, course).await.unwrap();
        assert_eq!(detail.price.amount(), Decimal::new(2550, 2));
        assert_eq!(detail.instructor, "Ada Lovelace");

        let err = fx
            .engine
            .update_course(&fx.admin, course, update("Rust", Decimal::new(5, 3)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = fx
            .engine
            .update_course(&ada, course, update("Rust", Decimal::ONE))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        let err = fx
            .engine
            .update_course(&fx.admin, CourseId::new(), update("Rust", Decimal::ONE))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "course not found");

        let module = fx
            .engine
            .update_module(
                &fx.admin,
                modules[0],
                ModuleUpdate {
                    title: "Borrowing".to_string(),
                    description: "The borrow checker".to_string(),
                    pdf_content: Some("/pdfs/borrowing.pdf".to_string()),
                    video_content: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(module.title, "Borrowing");
        assert_eq!(module.pdf_content.as_deref(), Some("/pdfs/borrowing.pdf"));
        assert_eq!(module.video_content.as_deref(), Some("/videos/1.mp4"));
        assert_eq!(module.order, 1);
    }

    #[tokio::test]
    async fn deleting_a_module_recomputes_progress() {
        let fx = setup().await;
        let ada = fx.learner("ada", 100).await;
        let (course, modules) = fx.course("Rust", 10, 2).await;
        fx.engine.purchase(course, ada.user_id).await.unwrap();
        fx.engine.complete_module(&ada, modules[0]).await.unwrap();

        fx.engine.delete_module(&fx.admin, modules[0]).await.unwrap();

        let progress = fx.engine.course_progress(ada.user_id, course).await.unwrap();
        assert_eq!(progress.total_modules, 1);
        assert_eq!(progress.completed_modules, 0);
        assert_eq!(progress.percentage, 0.0);

        let next = fx
            .engine
            .create_module(
                &fx.admin,
                course,
                NewModule {
                    title: "Appendix".to_string(),
                    description: String::new(),
                    pdf_content: None,
                    video_content: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(next.order, 3);
    }

    #[tokio::test]
    async fn deleting_a_course_removes_enrollments() {
        let fx = setup().await;
        let ada = fx.learner("ada", 100).await;
        let (course, _) = fx.course("Rust", 10, 1).await;
        fx.engine.purchase(course, ada.user_id).await.unwrap();

        fx.engine.delete_course(&fx.admin, course).await.unwrap();

        assert!(!fx.enrolled(ada.user_id, course).await);
        let err = fx.engine.course_detail(&ada, course).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = fx.engine.delete_course(&fx.admin, course).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn module_listing_is_gated_and_flags_completion() {
        let fx = setup().await;
        let ada = fx.learner("ada", 100).await;
        let (course, modules) = fx.course("Rust", 10, 3).await;

        let err = fx
            .engine
            .list_modules(&ada, course, PageRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        let err = fx.engine.module_detail(&ada, modules[0]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        fx.engine.purchase(course, ada.user_id).await.unwrap();
        fx.engine.complete_module(&ada, modules[1]).await.unwrap();

        let page = fx
            .engine
            .list_modules(&ada, course, PageRequest::default())
            .await
            .unwrap();
        let flags: Vec<(i32, bool)> = page.items.iter().map(|m| (m.order, m.is_completed)).collect();
        assert_eq!(flags, vec![(1, false), (2, true), (3, false)]);
        assert!(fx.engine.module_detail(&ada, modules[1]).await.unwrap().is_completed);
    }

    #[tokio::test]
    async fn catalog_views_reflect_the_viewer() {
        let fx = setup().await;
        let ada = fx.learner("ada", 100).await;
        let (rust, modules) = fx.course("Rust", 10, 2).await;
        let (_go, _) = fx.course("Go", 10, 2).await;
        fx.engine.purchase(rust, ada.user_id).await.unwrap();
        fx.engine.complete_module(&ada, modules[0]).await.unwrap();

        let all = fx
            .engine
            .list_courses(&ada, None, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(all.pagination.total_items, 2);
        let purchased: Vec<bool> = all.items.iter().map(|c| c.is_purchased).collect();
        assert_eq!(purchased, vec![true, false]);
        assert_eq!(all.items[0].progress_percentage, 50.0);
        assert_eq!(all.items[1].total_modules, 2);

        let found = fx
            .engine
            .list_courses(&ada, Some("  GO "), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(found.items.len(), 1);
        assert_eq!(found.items[0].title, "Go");

        let detail = fx.engine.course_detail(&ada, rust).await.unwrap();
        assert!(detail.is_purchased);
        assert_eq!(detail.completed_modules, 1);
    }

    #[tokio::test]
    async fn listings_paginate() {
        let fx = setup().await;
        for n in 0..5 {
            fx.course(&format!("Course {n}"), 1, 0).await;
        }

        let page = fx
            .engine
            .list_courses(&fx.admin, None, PageRequest::new(Some(2), Some(2)))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.pagination.total_pages, 3);
        assert_eq!(page.pagination.prev_page, 1);
        assert_eq!(page.pagination.next_page, 3);
    }

    #[tokio::test]
    async fn my_courses_search_covers_instructor() {
        let fx = setup().await;
        let ada = fx.learner("ada", 100).await;
        let (rust, _) = fx.course("Rust", 10, 1).await;
        fx.engine.purchase(rust, ada.user_id).await.unwrap();

        let hits = fx
            .engine
            .my_courses(&ada, Some("hopper"), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(hits.items.len(), 1);
        assert!(!hits.items[0].purchased_at.is_empty());

        let misses = fx
            .engine
            .my_courses(&ada, Some("haskell"), PageRequest::default())
            .await
            .unwrap();
        assert!(misses.items.is_empty());
    }

    #[tokio::test]
    async fn dashboard_counts_finished_courses() {
        let fx = setup().await;
        let ada = fx.learner("ada", 100).await;
        let (rust, rust_modules) = fx.course("Rust", 10, 1).await;
        let (go, _) = fx.course("Go", 10, 2).await;
        fx.engine.purchase(rust, ada.user_id).await.unwrap();
        fx.engine.purchase(go, ada.user_id).await.unwrap();
        fx.engine.complete_module(&ada, rust_modules[0]).await.unwrap();

        let dashboard = fx.engine.dashboard(&ada).await.unwrap();
        assert_eq!(dashboard.balance.amount(), Decimal::from(80));
        assert_eq!(dashboard.total_enrolled, 2);
        assert_eq!(dashboard.completed_courses, 1);

        let overview = fx.engine.admin_overview(&fx.admin).await.unwrap();
        assert_eq!(overview.total_users, 2);
        assert_eq!(overview.total_courses, 2);
        assert_eq!(overview.total_modules, 3);
    }

    #[tokio::test]
    async fn balance_adjustments_floor_at_zero() {
        let fx = setup().await;
        let ada = fx.learner("ada", 30).await;

        let user = fx
            .engine
            .adjust_balance(&fx.admin, ada.user_id, Decimal::from(-50))
            .await
            .unwrap();
        assert!(user.balance.is_zero());

        let err = fx
            .engine
            .adjust_balance(&fx.admin, UserId::new(), Decimal::ONE)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn out_of_range_adjustment_is_a_validation_error() {
        let fx = setup().await;
        let ada = fx.learner("ada", 30).await;

        let err = fx
            .engine
            .adjust_balance(&fx.admin, ada.user_id, Decimal::MAX)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(fx.balance(ada.user_id).await, Decimal::from(30));

        let err = fx
            .engine
            .adjust_balance(&fx.admin, ada.user_id, Decimal::new(1, 3))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn user_administration() {
        let fx = setup().await;
        let ada = fx.learner("ada", 100).await;
        let grace = fx.learner("grace", 0).await;
        let (course, _) = fx.course("Rust", 10, 1).await;
        fx.engine.purchase(course, ada.user_id).await.unwrap();

        let detail = fx.engine.user_detail(&fx.admin, ada.user_id).await.unwrap();
        assert_eq!(detail.courses_purchased, 1);

        let err = fx
            .engine
            .update_profile(
                &fx.admin,
                grace.user_id,
                ProfileUpdate {
                    username: "ada".to_string(),
                    email: "grace@example.com".to_string(),
                    first_name: "Grace".to_string(),
                    last_name: "Hopper".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "username or email already exists");

        let updated = fx
            .engine
            .update_profile(
                &fx.admin,
                grace.user_id,
                ProfileUpdate {
                    username: "grace".to_string(),
                    email: "grace@navy.mil".to_string(),
                    first_name: "Grace".to_string(),
                    last_name: "Hopper".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.email, "grace@navy.mil");

        let found = fx
            .engine
            .list_users(&fx.admin, Some("navy"), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(found.items.len(), 1);

        let err = fx.engine.delete_user(&fx.admin, fx.admin.user_id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(err.to_string(), "cannot delete admin user");

        fx.engine.delete_user(&fx.admin, ada.user_id).await.unwrap();
        assert!(!fx.enrolled(ada.user_id, course).await);
    }

    #[tokio::test]
    async fn registration_rejects_taken_identity() {
        let fx = setup().await;
        fx.learner("ada", 0).await;

        let err = fx
            .engine
            .register_user(NewUser {
                username: "ada".to_string(),
                email: "other@example.com".to_string(),
                first_name: String::new(),
                last_name: String::new(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let (_, created) = fx.engine.ensure_admin("admin", "admin@example.com").await.unwrap();
        assert!(!created);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn completed_never_exceeds_total(
            modules in 1usize..6,
            picks in proptest::collection::vec(0usize..8, 0..20),
            delete_first in any::<bool>(),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            rt.block_on(async {
                let fx = setup().await;
                let ada = fx.learner("ada", 100).await;
                let (course, ids) = fx.course("Rust", 10, modules).await;
                fx.engine.purchase(course, ada.user_id).await.unwrap();

                for pick in &picks {
                    let module = ids[pick % ids.len()];
                    if let Ok(result) = fx.engine.complete_module(&ada, module).await {
                        prop_assert!(result.course_progress.completed_modules <= result.course_progress.total_modules);
                        prop_assert!(result.course_progress.percentage <= 100.0);
                    }
                }
                if delete_first {
                    fx.engine.delete_module(&fx.admin, ids[0]).await.unwrap();
                }

                let progress = fx.engine.course_progress(ada.user_id, course).await.unwrap();
                prop_assert!(progress.completed_modules <= progress.total_modules);
                Ok(())
            })?;
        }
    }
}
