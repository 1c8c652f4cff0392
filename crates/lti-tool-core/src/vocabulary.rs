// IMS role and context-type vocabularies.
//
// Canonical URIs from the LTI 1.3 core spec (LIS v2 vocabularies) and the
// AGS 2.0 scope list. Pure lookups with no state and no failure modes.

use serde::{Deserialize, Serialize};

pub const CONTEXT_ROLE_PREFIX: &str = "http://purl.imsglobal.org/vocab/lis/v2/membership#";
pub const SYSTEM_ROLE_PREFIX: &str = "http://purl.imsglobal.org/vocab/lis/v2/system/person#";
pub const INSTITUTION_ROLE_PREFIX: &str =
    "http://purl.imsglobal.org/vocab/lis/v2/institution/person#";
pub const CONTEXT_TYPE_PREFIX: &str = "http://purl.imsglobal.org/vocab/lis/v2/course#";

/// Context-level roles. These are the roles that drive membership flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContextRole {
    Administrator,
    ContentDeveloper,
    Instructor,
    Learner,
    Mentor,
}

impl ContextRole {
    pub const ALL: [ContextRole; 5] = [
        ContextRole::Administrator,
        ContextRole::ContentDeveloper,
        ContextRole::Instructor,
        ContextRole::Learner,
        ContextRole::Mentor,
    ];

    pub fn short_name(&self) -> &'static str {
        match self {
            Self::Administrator => "Administrator",
            Self::ContentDeveloper => "ContentDeveloper",
            Self::Instructor => "Instructor",
            Self::Learner => "Learner",
            Self::Mentor => "Mentor",
        }
    }

    pub fn uri(&self) -> String {
        format!("{CONTEXT_ROLE_PREFIX}{}", self.short_name())
    }
}

/// System-level roles carried in the roles claim alongside context roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SystemRole {
    Administrator,
    None,
    AccountAdmin,
    Creator,
    SysAdmin,
    SysSupport,
    User,
}

impl SystemRole {
    pub fn short_name(&self) -> &'static str {
        match self {
            Self::Administrator => "Administrator",
            Self::None => "None",
            Self::AccountAdmin => "AccountAdmin",
            Self::Creator => "Creator",
            Self::SysAdmin => "SysAdmin",
            Self::SysSupport => "SysSupport",
            Self::User => "User",
        }
    }

    pub fn uri(&self) -> String {
        format!("{SYSTEM_ROLE_PREFIX}{}", self.short_name())
    }
}

/// Institution-level roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstitutionRole {
    Administrator,
    Faculty,
    Guest,
    None,
    Other,
    Staff,
    Student,
    Alumni,
    Instructor,
    Learner,
    Member,
    Mentor,
    Observer,
    ProspectiveStudent,
}

impl InstitutionRole {
    pub fn short_name(&self) -> &'static str {
        match self {
            Self::Administrator => "Administrator",
            Self::Faculty => "Faculty",
            Self::Guest => "Guest",
            Self::None => "None",
            Self::Other => "Other",
            Self::Staff => "Staff",
            Self::Student => "Student",
            Self::Alumni => "Alumni",
            Self::Instructor => "Instructor",
            Self::Learner => "Learner",
            Self::Member => "Member",
            Self::Mentor => "Mentor",
            Self::Observer => "Observer",
            Self::ProspectiveStudent => "ProspectiveStudent",
        }
    }

    pub fn uri(&self) -> String {
        format!("{INSTITUTION_ROLE_PREFIX}{}", self.short_name())
    }
}

/// Context types from the course vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContextType {
    CourseTemplate,
    CourseOffering,
    CourseSection,
    Group,
}

impl ContextType {
    pub fn short_name(&self) -> &'static str {
        match self {
            Self::CourseTemplate => "CourseTemplate",
            Self::CourseOffering => "CourseOffering",
            Self::CourseSection => "CourseSection",
            Self::Group => "Group",
        }
    }

    pub fn uri(&self) -> String {
        format!("{CONTEXT_TYPE_PREFIX}{}", self.short_name())
    }
}

/// AGS 2.0 authorization scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgsScope {
    ManageLineItems,
    QueryLineItems,
    PublishScores,
    AccessResults,
}

impl AgsScope {
    pub const ALL: [AgsScope; 4] = [
        AgsScope::ManageLineItems,
        AgsScope::QueryLineItems,
        AgsScope::PublishScores,
        AgsScope::AccessResults,
    ];

    pub fn uri(&self) -> &'static str {
        match self {
            Self::ManageLineItems => "https://purl.imsglobal.org/spec/lti-ags/scope/lineitem",
            Self::QueryLineItems => {
                "https://purl.imsglobal.org/spec/lti-ags/scope/lineitem.readonly"
            }
            Self::PublishScores => "https://purl.imsglobal.org/spec/lti-ags/scope/score",
            Self::AccessResults => "https://purl.imsglobal.org/spec/lti-ags/scope/result.readonly",
        }
    }
}

/// Expands a bare context-role token to its full membership URI.
///
/// Anything that is not a bare `\w+` token is already a qualified URI (from
/// this or another vocabulary) and passes through unchanged. Total over all
/// inputs and idempotent.
pub fn normalize_role(role: &str) -> String {
    let bare = regex::Regex::new(r"^\w+$")
        .map(|re| re.is_match(role))
        .unwrap_or(false);
    if bare {
        format!("{CONTEXT_ROLE_PREFIX}{role}")
    } else {
        role.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_bare_role() {
        assert_eq!(
            normalize_role("Learner"),
            "http://purl.imsglobal.org/vocab/lis/v2/membership#Learner"
        );
    }

    #[test]
    fn test_normalize_full_uri_passthrough() {
        let uri = "http://purl.imsglobal.org/vocab/lis/v2/membership#Learner";
        assert_eq!(normalize_role(uri), uri);

        let institution = "http://purl.imsglobal.org/vocab/lis/v2/institution/person#Staff";
        assert_eq!(normalize_role(institution), institution);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize_role("Instructor");
        assert_eq!(normalize_role(&once), once);
    }

    #[test]
    fn test_context_role_uris() {
        assert_eq!(
            ContextRole::Instructor.uri(),
            "http://purl.imsglobal.org/vocab/lis/v2/membership#Instructor"
        );
        assert_eq!(ContextRole::ContentDeveloper.short_name(), "ContentDeveloper");
    }

    #[test]
    fn test_context_type_uris() {
        assert_eq!(
            ContextType::CourseOffering.uri(),
            "http://purl.imsglobal.org/vocab/lis/v2/course#CourseOffering"
        );
    }

    #[test]
    fn test_system_and_institution_uris() {
        assert_eq!(
            SystemRole::SysAdmin.uri(),
            "http://purl.imsglobal.org/vocab/lis/v2/system/person#SysAdmin"
        );
        assert_eq!(
            InstitutionRole::ProspectiveStudent.uri(),
            "http://purl.imsglobal.org/vocab/lis/v2/institution/person#ProspectiveStudent"
        );
    }

    #[test]
    fn test_ags_scope_uris() {
        assert_eq!(
            AgsScope::PublishScores.uri(),
            "https://purl.imsglobal.org/spec/lti-ags/scope/score"
        );
        assert_eq!(AgsScope::ALL.len(), 4);
    }

    #[test]
    fn test_normalized_role_matches_context_role() {
        let normalized = normalize_role("Mentor");
        assert_eq!(normalized, ContextRole::Mentor.uri());
    }
}
