//! Business-level reserved names, checked only against trimmed/lowercased input.

/// Every company gets exactly one branch with this literal name, created at
/// company creation. Undeletable/unrenamable except by a superadmin.
pub const MAIN_BRANCH_NAME: &str = "main";

/// Reserved role name. May not be created or assumed by non-superadmins;
/// each company's `companyAdmin` row carries every known permission.
pub const COMPANY_ADMIN_ROLE: &str = "companyadmin";

/// Usernames no tenant may register, compared lowercased/trimmed.
pub const FORBIDDEN_USERNAMES: &[&str] = &["admin", "root", "superadmin", "system", "support"];

/// Permission set granted to a mobile user created through invite-code
/// registration. Kept intentionally small: a driver app doesn't need more.
pub const DEFAULT_MOBILE_PERMISSIONS: &[&str] = &[
    "missions:read",
    "missions:update-status",
    "routes:read",
];

pub fn is_reserved_branch_name(name: &str) -> bool {
    name.trim().eq_ignore_ascii_case(MAIN_BRANCH_NAME)
}

pub fn is_reserved_role_name(name: &str) -> bool {
    name.trim().eq_ignore_ascii_case(COMPANY_ADMIN_ROLE)
}

pub fn is_forbidden_username(name: &str) -> bool {
    let normalized = name.trim().to_ascii_lowercase();
    FORBIDDEN_USERNAMES.contains(&normalized.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_names_are_case_and_whitespace_insensitive() {
        assert!(is_reserved_branch_name("  Main  "));
        assert!(is_reserved_role_name("CompanyAdmin"));
        assert!(is_forbidden_username(" Admin "));
        assert!(!is_forbidden_username("driver1"));
    }
}
