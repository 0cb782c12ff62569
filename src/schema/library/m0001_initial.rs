use crate::schema::fields::{FieldDef, FieldKind};
use crate::schema::{Migration, Operation};

use super::APP_LABEL;

/// Initial `library` schema: the `Book` model.
pub const MIGRATION: Migration = Migration {
    app_label: APP_LABEL,
    name: "0001_initial",
    dependencies: &[],
    operations: &[Operation::CreateModel {
        name: "Book",
        fields: &[
            (
                "id",
                FieldDef::new(FieldKind::AutoPrimaryKey).verbose_name("ID"),
            ),
            (
                "title",
                FieldDef::new(FieldKind::Char { max_length: 200 }).verbose_name("название"),
            ),
            (
                "best_seller",
                FieldDef::new(FieldKind::Boolean).verbose_name("бестселлер"),
            ),
        ],
    }],
};
