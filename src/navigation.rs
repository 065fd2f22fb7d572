//! Route table and role-gated navigation
//!
//! Every screen of the client has a path under `/bancavirtual`. The
//! dashboard routes require a session; anonymous visitors are sent to the
//! login route. Which menu entries a user sees depends on their role.

use std::fmt;

use crate::core_types::{AccountNo, RecordId, Role};
use crate::session::Session;

pub const VISITOR_ROUTE: &str = "/";
pub const LOGIN_ROUTE: &str = "/bancavirtual/acceso";
pub const VERIFY_ROUTE: &str = "/bancavirtual/acceso/verificación";
pub const DASHBOARD_ROUTE: &str = "/bancavirtual";

// ============================================================================
// Sections and menu
// ============================================================================

/// Dashboard section, as highlighted in the navigation bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Users,
    Accounts,
    AccountsAdmin,
    Transfers,
    MyAccounts,
}

impl Section {
    pub const ALL: [Section; 5] = [
        Section::Users,
        Section::Accounts,
        Section::AccountsAdmin,
        Section::Transfers,
        Section::MyAccounts,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Section::Users => "users",
            Section::Accounts => "accounts",
            Section::AccountsAdmin => "accountsAdmin",
            Section::Transfers => "transfers",
            Section::MyAccounts => "myaccounts",
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            Section::Users => "/bancavirtual/usuarios",
            Section::Accounts => "/bancavirtual/cuentas",
            Section::AccountsAdmin => "/bancavirtual/cuentas-admin",
            Section::Transfers => "/bancavirtual/transferencias",
            Section::MyAccounts => "/bancavirtual/mis-cuentas",
        }
    }

    pub fn from_key(key: &str) -> Option<Section> {
        Section::ALL.into_iter().find(|s| s.key() == key)
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Section for `path`: exact match first, otherwise the longest section
/// path that prefixes it.
pub fn active_section(path: &str) -> Option<Section> {
    if let Some(exact) = Section::ALL.into_iter().find(|s| s.path() == path) {
        return Some(exact);
    }
    Section::ALL
        .into_iter()
        .filter(|s| path.starts_with(s.path()))
        .max_by_key(|s| s.path().len())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MenuItem {
    pub section: Section,
    pub label: &'static str,
    pub roles: &'static [Role],
}

impl MenuItem {
    pub fn allows(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

pub const MENU: [MenuItem; 3] = [
    MenuItem {
        section: Section::Users,
        label: "Usuarios",
        roles: &[Role::Admin, Role::Client, Role::Supervisor],
    },
    MenuItem {
        section: Section::Accounts,
        label: "Cuentas",
        roles: &[Role::Admin, Role::Client, Role::Supervisor],
    },
    MenuItem {
        section: Section::Transfers,
        label: "Transferencias",
        roles: &[Role::Admin, Role::Client, Role::Supervisor],
    },
];

/// Entries of `menu` the role may see. No role, no entries.
pub fn visible_items(menu: &[MenuItem], role: Option<Role>) -> Vec<MenuItem> {
    match role {
        Some(role) => menu.iter().filter(|item| item.allows(role)).copied().collect(),
        None => Vec::new(),
    }
}

pub fn visible_menu(role: Option<Role>) -> Vec<MenuItem> {
    visible_items(&MENU, role)
}

// ============================================================================
// Routes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Page {
    Visitor,
    Auth,
    VerifyEmail,
    Dashboard,
    Users,
    CreateAccount,
    AccountsAdmin,
    MyAccounts,
    Transfers,
    DeleteAccount { id: RecordId },
    Deposits,
    Favorites,
    History { account_no: AccountNo },
}

struct RouteDef {
    pattern: &'static str,
    gated: bool,
    build: fn(&[String]) -> Page,
}

fn first(params: &[String]) -> String {
    params.first().cloned().unwrap_or_default()
}

const ROUTES: [RouteDef; 13] = [
    RouteDef { pattern: LOGIN_ROUTE, gated: false, build: |_| Page::Auth },
    RouteDef { pattern: VERIFY_ROUTE, gated: false, build: |_| Page::VerifyEmail },
    RouteDef { pattern: DASHBOARD_ROUTE, gated: true, build: |_| Page::Dashboard },
    RouteDef { pattern: "/bancavirtual/usuarios", gated: true, build: |_| Page::Users },
    RouteDef { pattern: "/bancavirtual/cuentas", gated: true, build: |_| Page::CreateAccount },
    RouteDef { pattern: "/bancavirtual/cuentas-admin", gated: true, build: |_| Page::AccountsAdmin },
    RouteDef { pattern: "/bancavirtual/mis-cuentas", gated: true, build: |_| Page::MyAccounts },
    RouteDef { pattern: "/bancavirtual/transferencias", gated: true, build: |_| Page::Transfers },
    RouteDef {
        pattern: "/bancavirtual/cuentas/eliminar/:id",
        gated: true,
        build: |p| Page::DeleteAccount { id: first(p) },
    },
    RouteDef { pattern: "/bancavirtual/depositos", gated: true, build: |_| Page::Deposits },
    RouteDef { pattern: "/bancavirtual/my-favorites", gated: true, build: |_| Page::Favorites },
    RouteDef {
        pattern: "/bancavirtual/my-historial/:noAccount",
        gated: true,
        build: |p| Page::History { account_no: first(p) },
    },
    RouteDef { pattern: VISITOR_ROUTE, gated: false, build: |_| Page::Visitor },
];

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Match `path` against `pattern`, collecting `:param` segments.
fn match_pattern(pattern: &str, path: &str) -> Option<Vec<String>> {
    let pattern = segments(pattern);
    let path = segments(path);
    if pattern.len() != path.len() {
        return None;
    }
    let mut params = Vec::new();
    for (expected, actual) in pattern.iter().zip(&path) {
        if expected.starts_with(':') {
            params.push(actual.to_string());
        } else if expected != actual {
            return None;
        }
    }
    Some(params)
}

/// The page at `path` and whether it needs a session.
pub fn resolve(path: &str) -> Option<(Page, bool)> {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    ROUTES.iter().find_map(|route| {
        match_pattern(route.pattern, path).map(|params| ((route.build)(&params), route.gated))
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    Allow(Page),
    Redirect(&'static str),
    NotFound,
}

/// Decide what to render for `path` given the current session.
pub fn guard(session: Option<&Session>, path: &str) -> Guard {
    match resolve(path) {
        None => Guard::NotFound,
        Some((_, true)) if session.is_none() => Guard::Redirect(LOGIN_ROUTE),
        Some((page, _)) => Guard::Allow(page),
    }
}

/// Route for `page`.
pub fn path_for(page: &Page) -> String {
    match page {
        Page::Visitor => VISITOR_ROUTE.to_string(),
        Page::Auth => LOGIN_ROUTE.to_string(),
        Page::VerifyEmail => VERIFY_ROUTE.to_string(),
        Page::Dashboard => DASHBOARD_ROUTE.to_string(),
        Page::Users => Section::Users.path().to_string(),
        Page::CreateAccount => Section::Accounts.path().to_string(),
        Page::AccountsAdmin => Section::AccountsAdmin.path().to_string(),
        Page::MyAccounts => Section::MyAccounts.path().to_string(),
        Page::Transfers => Section::Transfers.path().to_string(),
        Page::DeleteAccount { id } => format!("/bancavirtual/cuentas/eliminar/{}", id),
        Page::Deposits => "/bancavirtual/depositos".to_string(),
        Page::Favorites => "/bancavirtual/my-favorites".to_string(),
        Page::History { account_no } => format!("/bancavirtual/my-historial/{}", account_no),
    }
}
