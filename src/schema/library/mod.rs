mod m0001_initial;
mod m0005_book_quantity_order_requestextension;
mod m0006_alter_book_best_seller;

use super::Migration;

pub const APP_LABEL: &str = "library";

pub static MIGRATIONS: &[Migration] = &[
    m0001_initial::MIGRATION,
    m0005_book_quantity_order_requestextension::MIGRATION,
    m0006_alter_book_best_seller::MIGRATION,
];
