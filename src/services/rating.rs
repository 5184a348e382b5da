//! Rating aggregator
//!
//! Users score pictures from 1 to 5, once per picture. The average is always
//! computed by the store; nothing is kept in memory between calls.

use crate::db::is_unique_violation;
use crate::db::repositories::RatingRepository;
use crate::models::{is_valid_rating, Rating, RatingSummary, User};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum RatingError {
    #[error("Rating must be between 1 and 5, got {0}")]
    BadRequest(i32),

    #[error("User {user_id} already rated picture {picture_id}")]
    Conflict { user_id: i64, picture_id: i64 },

    #[error("No rating by user {user_id} for picture {picture_id}")]
    NotFound { user_id: i64, picture_id: i64 },

    #[error("Storage error: {0}")]
    StorageError(#[from] anyhow::Error),
}

pub struct RatingService {
    repo: Arc<dyn RatingRepository>,
}

impl RatingService {
    pub fn new(repo: Arc<dyn RatingRepository>) -> Self {
        Self { repo }
    }

    /// Record `rater`'s score for a picture.
    ///
    /// The existence check here only gives a friendlier early answer; the
    /// `UNIQUE(user_id, picture_id)` constraint decides concurrent inserts.
    pub async fn create(&self, picture_id: i64, value: i32, rater: &User) -> Result<Rating, RatingError> {
        if !is_valid_rating(value) {
            return Err(RatingError::BadRequest(value));
        }

        let conflict = || RatingError::Conflict {
            user_id: rater.id,
            picture_id,
        };

        if self.repo.get(rater.id, picture_id).await?.is_some() {
            return Err(conflict());
        }

        match self.repo.create(rater.id, picture_id, value).await {
            Ok(rating) => {
                tracing::debug!("User {} rated picture {} with {}", rater.id, picture_id, value);
                Ok(rating)
            }
            Err(e) if is_unique_violation(&e) => Err(conflict()),
            Err(e) => Err(RatingError::StorageError(e)),
        }
    }

    /// Mean score of a picture. A picture nobody rated yields `average: None`.
    pub async fn average(&self, picture_id: i64) -> Result<RatingSummary, RatingError> {
        Ok(self.repo.summary(picture_id).await?)
    }

    /// Delete the rating `user_id` gave to a picture and return it.
    pub async fn remove(&self, picture_id: i64, user_id: i64) -> Result<Rating, RatingError> {
        self.repo
            .delete(user_id, picture_id)
            .await?
            .ok_or(RatingError::NotFound { user_id, picture_id })
    }

    /// All ratings of a picture, oldest first
    pub async fn list(&self, picture_id: i64) -> Result<Vec<Rating>, RatingError> {
        Ok(self.repo.list_by_picture(picture_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxRatingRepository, SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::UserRole;
    use async_trait::async_trait;
    use proptest::prelude::*;

    /// Service plus `count` users with ids 1..=count
    async fn setup_test_service(count: usize) -> (RatingService, Vec<User>) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let users = SqlxUserRepository::new(pool.clone());
        let mut raters = Vec::with_capacity(count);
        for i in 1..=count {
            let user = users
                .create(&User::new(
                    format!("rater{}", i),
                    format!("rater{}@example.com", i),
                    "hash".to_string(),
                    UserRole::User,
                ))
                .await
                .expect("Failed to create user");
            raters.push(user);
        }

        (RatingService::new(SqlxRatingRepository::boxed(pool)), raters)
    }

    fn assert_average(summary: RatingSummary, expected: f64) {
        let average = summary.average.expect("picture has ratings");
        assert!(
            (average - expected).abs() < f64::EPSILON,
            "average {} != {}",
            average,
            expected
        );
    }

    #[tokio::test]
    async fn test_out_of_range_values_rejected() {
        let (service, raters) = setup_test_service(1).await;

        for value in [0, 6, -1, 100] {
            let err = service.create(3, value, &raters[0]).await.unwrap_err();
            assert!(matches!(err, RatingError::BadRequest(v) if v == value));
        }
        assert_eq!(service.average(3).await.unwrap().count, 0);
    }

    #[tokio::test]
    async fn test_boundary_values_accepted() {
        let (service, raters) = setup_test_service(2).await;

        assert_eq!(service.create(3, 1, &raters[0]).await.unwrap().rating, 1);
        assert_eq!(service.create(3, 5, &raters[1]).await.unwrap().rating, 5);

        let summary = service.average(3).await.unwrap();
        assert_eq!(summary.count, 2);
        assert_average(summary, 3.0);
    }

    #[tokio::test]
    async fn test_second_rating_for_same_pair_conflicts() {
        let (service, raters) = setup_test_service(7).await;
        let rater = &raters[6];
        assert_eq!(rater.id, 7);

        service.create(3, 4, rater).await.unwrap();
        let err = service.create(3, 2, rater).await.unwrap_err();

        assert!(matches!(
            err,
            RatingError::Conflict { user_id: 7, picture_id: 3 }
        ));

        let summary = service.average(3).await.unwrap();
        assert_eq!(summary.count, 1);
        assert_average(summary, 4.0);
    }

    #[tokio::test]
    async fn test_average_of_unrated_picture() {
        let (service, _) = setup_test_service(0).await;

        let summary = service.average(42).await.unwrap();
        assert_eq!(summary.count, 0);
        assert_eq!(summary.average, None);
    }

    #[tokio::test]
    async fn test_remove() {
        let (service, raters) = setup_test_service(2).await;

        let err = service.remove(3, raters[0].id).await.unwrap_err();
        assert!(matches!(err, RatingError::NotFound { picture_id: 3, .. }));

        service.create(3, 2, &raters[0]).await.unwrap();
        service.create(3, 4, &raters[1]).await.unwrap();

        let removed = service.remove(3, raters[0].id).await.unwrap();
        assert_eq!(removed.rating, 2);

        let remaining = service.list(3).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].user_id, raters[1].id);

        // The pair is free again
        service.create(3, 5, &raters[0]).await.unwrap();
    }

    /// Reports every pair as unrated, as a concurrent insert would look to the pre-check
    struct BlindLookups {
        inner: Arc<dyn RatingRepository>,
    }

    #[async_trait]
    impl RatingRepository for BlindLookups {
        async fn create(&self, user_id: i64, picture_id: i64, value: i32) -> anyhow::Result<Rating> {
            self.inner.create(user_id, picture_id, value).await
        }
        async fn get(&self, _user_id: i64, _picture_id: i64) -> anyhow::Result<Option<Rating>> {
            Ok(None)
        }
        async fn list_by_picture(&self, picture_id: i64) -> anyhow::Result<Vec<Rating>> {
            self.inner.list_by_picture(picture_id).await
        }
        async fn summary(&self, picture_id: i64) -> anyhow::Result<RatingSummary> {
            self.inner.summary(picture_id).await
        }
        async fn delete(&self, user_id: i64, picture_id: i64) -> anyhow::Result<Option<Rating>> {
            self.inner.delete(user_id, picture_id).await
        }
    }

    #[tokio::test]
    async fn test_store_constraint_decides_duplicate() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let rater = SqlxUserRepository::new(pool.clone())
            .create(&User::new(
                "rater".to_string(),
                "rater@example.com".to_string(),
                "hash".to_string(),
                UserRole::User,
            ))
            .await
            .expect("Failed to create user");
        let service = RatingService::new(Arc::new(BlindLookups {
            inner: SqlxRatingRepository::boxed(pool),
        }));

        service.create(3, 4, &rater).await.unwrap();
        let err = service.create(3, 2, &rater).await.unwrap_err();

        assert!(matches!(
            err,
            RatingError::Conflict { user_id, picture_id: 3 } if user_id == rater.id
        ));
        let summary = service.average(3).await.unwrap();
        assert_eq!(summary.count, 1);
        assert_average(summary, 4.0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        /// Values inside 1..=5 are stored, anything else is rejected untouched.
        #[test]
        fn prop_value_range(value in -10i32..=15) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let (result, count) = rt.block_on(async {
                let (service, raters) = setup_test_service(1).await;
                let result = service.create(1, value, &raters[0]).await;
                let count = service.average(1).await.unwrap().count;
                (result, count)
            });

            if (1..=5).contains(&value) {
                prop_assert_eq!(result.unwrap().rating, value);
                prop_assert_eq!(count, 1);
            } else {
                prop_assert!(matches!(result, Err(RatingError::BadRequest(_))));
                prop_assert_eq!(count, 0);
            }
        }
    }
}
