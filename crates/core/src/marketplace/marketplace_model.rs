use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::CacheRecord;
use crate::errors::{Error, Result};

pub const ACTION_MARKETPLACE_PUBLISH: &str = "marketplace:publish";
pub const ACTION_MARKETPLACE_UNPUBLISH: &str = "marketplace:unpublish";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Knowledge records the lesson is built from.
    #[serde(default)]
    pub knowledge_record_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseModule {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
}

/// Course outline generated from a knowledge collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Syllabus {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub target_audience: String,
    #[serde(default)]
    pub learning_objectives: Vec<String>,
    #[serde(default)]
    pub modules: Vec<CourseModule>,
}

impl Syllabus {
    /// A publishable syllabus has a title and at least one module.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::invalid_input("syllabus title is empty"));
        }
        if self.modules.is_empty() {
            return Err(Error::invalid_input("syllabus has no modules"));
        }
        Ok(())
    }

    pub fn lesson_count(&self) -> usize {
        self.modules.iter().map(|module| module.lessons.len()).sum()
    }

    /// Every knowledge record referenced by a lesson, first occurrence order.
    pub fn knowledge_record_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for lesson in self.modules.iter().flat_map(|module| &module.lessons) {
            for id in &lesson.knowledge_record_ids {
                if !ids.contains(&id.as_str()) {
                    ids.push(id);
                }
            }
        }
        ids
    }
}

/// A published course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseListing {
    pub id: String,
    pub owner_id: String,
    pub collection_id: String,
    pub author_name: String,
    pub price_cents: u64,
    pub syllabus: Syllabus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CacheRecord for CourseListing {
    fn id(&self) -> &str {
        &self.id
    }

    fn owner_id(&self) -> &str {
        &self.owner_id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishCourseRequest {
    pub collection_id: String,
    pub author_name: String,
    pub price_cents: u64,
}

/// Listing as submitted to the marketplace service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCourseListing {
    pub collection_id: String,
    pub author_name: String,
    pub price_cents: u64,
    pub syllabus: Syllabus,
}
