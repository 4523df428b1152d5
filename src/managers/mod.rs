// SmartMarks state managers
// Session observer, local list, edit form, live sync and bookmark commands.

pub mod bookmark_list;
pub mod bookmark_manager;
pub mod edit_form;
pub mod session_manager;
pub mod sync_manager;
