use serde::Serialize;

use crate::session::Role;

/// A navigation menu entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MenuItem {
    pub label: &'static str,
    pub path: &'static str,
}

const fn item(label: &'static str, path: &'static str) -> MenuItem {
    MenuItem { label, path }
}

const PARENT_MENU: &[MenuItem] = &[
    item("Dashboard", "/dashboard"),
    item("Children", "/children"),
    item("Challenges", "/quests/manage"),
    item("Behaviors", "/behaviors"),
    item("Rewards", "/rewards/manage"),
    item("Attendance", "/attendance"),
    item("Quizzes", "/quizzes/manage"),
    item("Settings", "/settings"),
];

const KID_MENU: &[MenuItem] = &[
    item("Challenges", "/kid/quests"),
    item("Wishlist", "/kid/wishlist"),
    item("Quizzes", "/kid/quizzes"),
    item("Profile", "/kid/profile"),
];

const SIGNED_OUT_MENU: &[MenuItem] = &[
    item("Parent login", "/login"),
    item("Kid login", "/kid/login"),
];

/// Menu for `role`; labels shared between modes resolve per role
pub fn menu_for(role: Role) -> &'static [MenuItem] {
    match role {
        Role::Parent => PARENT_MENU,
        Role::Child => KID_MENU,
        Role::None => SIGNED_OUT_MENU,
    }
}

/// Resolve a menu label to a path for `role`
pub(crate) fn resolve(role: Role, label: &str) -> Option<&'static str> {
    menu_for(role)
        .iter()
        .find(|entry| entry.label.eq_ignore_ascii_case(label))
        .map(|entry| entry.path)
}
