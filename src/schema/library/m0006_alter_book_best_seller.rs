use crate::schema::fields::{FieldDef, FieldDefault, FieldKind};
use crate::schema::{Migration, Operation};

use super::APP_LABEL;

/// `Book.best_seller` gets a `false` default and its Russian labels.
pub const MIGRATION: Migration = Migration {
    app_label: APP_LABEL,
    name: "0006_alter_book_best_seller",
    dependencies: &[(APP_LABEL, "0005_book_quantity_order_requestextension")],
    operations: &[Operation::AlterField {
        model_name: "book",
        name: "best_seller",
        field: FieldDef::new(FieldKind::Boolean)
            .default(FieldDefault::Bool(false))
            .verbose_name("лидер продаж")
            .help_text("Является ли книга лидером продаж"),
    }],
};
