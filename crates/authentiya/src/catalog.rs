//! Course and assignment catalog.
//!
//! The catalog lists the courses a session can be started for. When it is
//! empty any non-empty course and assignment are accepted as typed.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Message shown when a session is started without a full selection.
pub const MISSING_SELECTION_MESSAGE: &str =
    "Please select both a course and an assignment before starting the session.";

/// An assignment within a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// Stable identifier, e.g. `cs101-hw1`.
    pub value: String,
    /// Display label.
    pub label: String,
}

/// A course and its assignments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    /// Stable identifier, e.g. `cs101`.
    pub value: String,
    /// Display name. Falls back to `value` when empty.
    #[serde(default)]
    pub name: String,
    /// Known assignments. An empty list accepts any assignment.
    #[serde(default)]
    pub assignments: Vec<Assignment>,
}

impl Course {
    /// The name to show for this course.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.value
        } else {
            &self.name
        }
    }

    fn find_assignment(&self, key: &str) -> Option<&Assignment> {
        self.assignments
            .iter()
            .find(|a| a.value == key || a.label == key)
    }
}

/// The configured list of courses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Catalog {
    /// Courses in display order.
    pub courses: Vec<Course>,
}

/// A validated course/assignment pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Course identifier.
    pub course_value: String,
    /// Course display name.
    pub course_name: String,
    /// Assignment identifier.
    pub assignment_value: String,
    /// Assignment display label.
    pub assignment_name: String,
}

impl Catalog {
    /// Check whether any courses are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.courses.is_empty()
    }

    /// Look up a course by value or display name.
    #[must_use]
    pub fn find_course(&self, key: &str) -> Option<&Course> {
        self.courses
            .iter()
            .find(|c| c.value == key || c.display_name() == key)
    }

    /// Validate a course/assignment selection and resolve display names.
    ///
    /// # Errors
    ///
    /// Returns a validation error if either part is blank, or if the catalog
    /// is non-empty and does not contain the selection.
    pub fn resolve(&self, course: &str, assignment: &str) -> Result<Selection> {
        let course = course.trim();
        let assignment = assignment.trim();

        if course.is_empty() || assignment.is_empty() {
            return Err(Error::validation(MISSING_SELECTION_MESSAGE));
        }

        if self.is_empty() {
            return Ok(Selection {
                course_value: course.to_string(),
                course_name: course.to_string(),
                assignment_value: assignment.to_string(),
                assignment_name: assignment.to_string(),
            });
        }

        let found = self
            .find_course(course)
            .ok_or_else(|| Error::validation(format!("Unknown course '{course}'.")))?;

        let (assignment_value, assignment_name) = if found.assignments.is_empty() {
            (assignment.to_string(), assignment.to_string())
        } else {
            let a = found.find_assignment(assignment).ok_or_else(|| {
                Error::validation(format!(
                    "Unknown assignment '{assignment}' for {}.",
                    found.display_name()
                ))
            })?;
            (a.value.clone(), a.label.clone())
        };

        Ok(Selection {
            course_value: found.value.clone(),
            course_name: found.display_name().to_string(),
            assignment_value,
            assignment_name,
        })
    }
}
