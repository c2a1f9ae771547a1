//! Schema-driven user administration
//!
//! The schema is fetched from the backend at run time and drives everything
//! else here: which form controls exist, how each value is validated, and
//! which table columns are shown. Nothing about the user shape is hard-coded
//! beyond the protected fields.

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

pub mod backend;
pub mod directory;
pub mod form;
pub mod mock;
pub mod renderer;
pub mod session;
pub mod store;
pub mod table;
pub mod validation;

pub use backend::AdminBackend;
pub use directory::{ListOutcome, PAGE_CACHE_CAPACITY, QueryTicket, UserDirectory};
pub use form::{FormMode, FormState, Submission, build_form, collect_submission, display_order, submit};
pub use mock::MockBackend;
pub use renderer::{
    ChoiceOption, Control, UNASSIGNED, Widget, render_admin_control, render_control,
    render_unsupported,
};
pub use session::{LOGIN_ROUTE, Session, SessionStore};
pub use store::SchemaStore;
pub use table::{
    CellFormat, ColumnDescriptor, ColumnKind, SortOption, TableProjector, project_columns,
    sort_options,
};
pub use validation::{FormValue, validate, validate_definition, validate_field_name};
