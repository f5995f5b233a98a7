use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::data::class::ClassKey;

pub mod archive;
pub mod db;
pub mod grading;

use grading::Grading;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Pending,
    Review,
    Graded,
    Rejected,
}

impl ProjectStatus {
    /// `graded` and `rejected` projects never change again.
    pub fn is_terminal(self) -> bool {
        match self {
            ProjectStatus::Pending | ProjectStatus::Review => false,
            ProjectStatus::Graded | ProjectStatus::Rejected => true,
        }
    }

    /// Statuses a project must be in to move into `self`.
    pub fn sources(self) -> &'static [ProjectStatus] {
        match self {
            ProjectStatus::Pending => &[],
            ProjectStatus::Review => &[ProjectStatus::Pending],
            ProjectStatus::Graded | ProjectStatus::Rejected => {
                &[ProjectStatus::Pending, ProjectStatus::Review]
            }
        }
    }

    pub fn can_move_to(self, to: ProjectStatus) -> bool {
        to.sources().contains(&self)
    }

    /// Still waiting for a grader.
    pub fn is_awaiting_review(self) -> bool {
        !self.is_terminal()
    }
}

impl Display for ProjectStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectStatus::Pending => write!(f, "pending"),
            ProjectStatus::Review => write!(f, "review"),
            ProjectStatus::Graded => write!(f, "graded"),
            ProjectStatus::Rejected => write!(f, "rejected"),
        }
    }
}

impl FromStr for ProjectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProjectStatus::Pending),
            "review" => Ok(ProjectStatus::Review),
            "graded" => Ok(ProjectStatus::Graded),
            "rejected" => Ok(ProjectStatus::Rejected),
            other => Err(format!("unknown project status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema)]
pub enum ProjectCategory {
    #[serde(rename = "Web Development")]
    WebDevelopment,
    #[serde(rename = "Mobile Development")]
    MobileDevelopment,
    #[serde(rename = "AI/ML")]
    AiMl,
    Cybersecurity,
    #[serde(rename = "Game Development")]
    GameDevelopment,
    #[serde(rename = "Data Science")]
    DataScience,
    #[serde(rename = "Cloud Computing")]
    CloudComputing,
    IoT,
    Other,
}

impl ProjectCategory {
    pub const ALL: [ProjectCategory; 9] = [
        ProjectCategory::WebDevelopment,
        ProjectCategory::MobileDevelopment,
        ProjectCategory::AiMl,
        ProjectCategory::Cybersecurity,
        ProjectCategory::GameDevelopment,
        ProjectCategory::DataScience,
        ProjectCategory::CloudComputing,
        ProjectCategory::IoT,
        ProjectCategory::Other,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ProjectCategory::WebDevelopment => "Web Development",
            ProjectCategory::MobileDevelopment => "Mobile Development",
            ProjectCategory::AiMl => "AI/ML",
            ProjectCategory::Cybersecurity => "Cybersecurity",
            ProjectCategory::GameDevelopment => "Game Development",
            ProjectCategory::DataScience => "Data Science",
            ProjectCategory::CloudComputing => "Cloud Computing",
            ProjectCategory::IoT => "IoT",
            ProjectCategory::Other => "Other",
        }
    }
}

impl Display for ProjectCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ProjectCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProjectCategory::ALL
            .iter()
            .copied()
            .find(|it| it.label() == s)
            .ok_or_else(|| format!("unknown project category '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema)]
pub enum ProjectType {
    Assignment,
    #[serde(rename = "Final Project")]
    FinalProject,
    Research,
    #[serde(rename = "Personal Project")]
    PersonalProject,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[cfg_attr(test, derive(Deserialize))]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: ProjectCategory,
    #[serde(default)]
    pub project_type: Option<ProjectType>,

    pub submitted_by: Uuid,
    pub submitted_by_name: String,

    #[serde(default)]
    pub assigned_teacher_id: Option<Uuid>,
    #[serde(default)]
    pub assigned_teacher_name: Option<String>,
    #[serde(default)]
    pub class_key: Option<ClassKey>,

    #[serde(default)]
    pub github_link: Option<String>,
    /// Opaque reference to the uploaded archive.
    #[serde(default)]
    pub zip_file: Option<String>,

    pub status: ProjectStatus,
    #[serde(default)]
    pub grades: Option<Grading>,
    #[serde(default)]
    pub reviewed_by: Option<Uuid>,

    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Project {
    /// Case-insensitive substring match over title, description and submitter name.
    pub fn matches_search(&self, search: &str) -> bool {
        let needle = search.to_lowercase();
        self.title.to_lowercase().contains(&needle)
            || self.description.to_lowercase().contains(&needle)
            || self.submitted_by_name.to_lowercase().contains(&needle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_machine_edges() {
        use ProjectStatus::*;

        assert!(Pending.can_move_to(Review));
        assert!(Pending.can_move_to(Graded));
        assert!(Review.can_move_to(Graded));
        assert!(Pending.can_move_to(Rejected));
        assert!(Review.can_move_to(Rejected));

        assert!(!Review.can_move_to(Pending));
        assert!(!Review.can_move_to(Review));
        for terminal in [Graded, Rejected] {
            assert!(terminal.is_terminal());
            for to in [Pending, Review, Graded, Rejected] {
                assert!(!terminal.can_move_to(to), "{} -> {}", terminal, to);
            }
        }
    }

    #[test]
    fn categories_use_display_labels_on_the_wire() {
        for category in ProjectCategory::ALL {
            let json = serde_json::to_string(&category).unwrap();
            assert_eq!(json, format!("\"{}\"", category.label()));
            assert_eq!(category.label().parse::<ProjectCategory>(), Ok(category));
        }
        assert!("Basket Weaving".parse::<ProjectCategory>().is_err());
    }

    #[test]
    fn project_type_labels() {
        assert_eq!(
            serde_json::to_string(&ProjectType::FinalProject).unwrap(),
            "\"Final Project\""
        );
        let parsed: ProjectType = serde_json::from_str("\"Personal Project\"").unwrap();
        assert_eq!(parsed, ProjectType::PersonalProject);
    }
}
