use crate::schema::fields::{FieldDef, FieldDefault, FieldKind};
use crate::schema::{Migration, Operation};

use super::APP_LABEL;

/// Adds stock tracking to `Book` and introduces orders and their
/// extension requests.
pub const MIGRATION: Migration = Migration {
    app_label: APP_LABEL,
    name: "0005_book_quantity_order_requestextension",
    dependencies: &[(APP_LABEL, "0001_initial")],
    operations: &[
        Operation::AddField {
            model_name: "book",
            name: "quantity",
            field: FieldDef::new(FieldKind::PositiveInteger)
                .default(FieldDefault::Int(1))
                .verbose_name("количество"),
        },
        Operation::CreateModel {
            name: "Order",
            fields: &[
                (
                    "id",
                    FieldDef::new(FieldKind::AutoPrimaryKey).verbose_name("ID"),
                ),
                (
                    "book",
                    FieldDef::new(FieldKind::ForeignKey { to: "book" }).verbose_name("книга"),
                ),
                (
                    "created_at",
                    FieldDef::new(FieldKind::DateTime).verbose_name("дата заказа"),
                ),
            ],
        },
        Operation::CreateModel {
            name: "RequestExtension",
            fields: &[
                (
                    "id",
                    FieldDef::new(FieldKind::AutoPrimaryKey).verbose_name("ID"),
                ),
                (
                    "order",
                    FieldDef::new(FieldKind::ForeignKey { to: "order" }).verbose_name("заказ"),
                ),
                (
                    "days",
                    FieldDef::new(FieldKind::PositiveInteger).verbose_name("дней продления"),
                ),
                (
                    "approved",
                    FieldDef::new(FieldKind::Boolean)
                        .default(FieldDefault::Bool(false))
                        .verbose_name("одобрено"),
                ),
            ],
        },
    ],
};
