//! Integration tests for dialect-level SQL rendering.

use factlens::dialect::{Dialect, MySqlDialect, PostgresDialect};
use factlens::models::AggregateFn;
use factlens::sql_ast::{
    Join, SelectItem, SelectQuery, SqlBinaryOperator, SqlExpr, SqlRenderer, TableRef,
};

fn column(table: &str, name: &str) -> SqlExpr {
    SqlExpr::Column {
        table: Some(table.to_string()),
        name: name.to_string(),
    }
}

fn grouped_query() -> SelectQuery {
    SelectQuery {
        select: vec![
            SelectItem {
                expr: SqlExpr::Aggregate {
                    agg: AggregateFn::Sum,
                    expr: Box::new(column("orders", "amount")),
                },
                alias: Some("Revenue".to_string()),
            },
            SelectItem {
                expr: column("customers", "country"),
                alias: Some("country".to_string()),
            },
        ],
        from: TableRef {
            name: "orders".to_string(),
        },
        joins: vec![Join {
            table: TableRef {
                name: "customers".to_string(),
            },
            on: vec![SqlExpr::BinaryOp {
                op: SqlBinaryOperator::Eq,
                left: Box::new(column("customers", "customer_id")),
                right: Box::new(column("orders", "customer_id")),
            }],
        }],
        filters: vec![SqlExpr::BinaryOp {
            op: SqlBinaryOperator::Eq,
            left: Box::new(column("customers", "country")),
            right: Box::new(SqlExpr::Param(0)),
        }],
        group_by: vec![column("customers", "country")],
    }
}

#[test]
fn postgres_rendering_quotes_and_numbers_placeholders() {
    let sql = SqlRenderer::new(&PostgresDialect).render_select(&grouped_query());
    assert_eq!(
        sql,
        "SELECT SUM(\"orders\".\"amount\") AS \"Revenue\", \
         \"customers\".\"country\" AS \"country\" \
         FROM \"orders\" \
         JOIN \"customers\" ON \"customers\".\"customer_id\" = \"orders\".\"customer_id\" \
         WHERE \"customers\".\"country\" = $1 \
         GROUP BY \"customers\".\"country\""
    );
}

#[test]
fn mysql_rendering_uses_backticks_and_question_marks() {
    let sql = SqlRenderer::new(&MySqlDialect).render_select(&grouped_query());
    assert_eq!(
        sql,
        "SELECT SUM(`orders`.`amount`) AS `Revenue`, \
         `customers`.`country` AS `country` \
         FROM `orders` \
         JOIN `customers` ON `customers`.`customer_id` = `orders`.`customer_id` \
         WHERE `customers`.`country` = ? \
         GROUP BY `customers`.`country`"
    );
}

#[test]
fn in_list_renders_one_placeholder_per_value() {
    let query = SelectQuery {
        select: vec![SelectItem {
            expr: column("orders", "id"),
            alias: None,
        }],
        from: TableRef {
            name: "orders".to_string(),
        },
        filters: vec![SqlExpr::InList {
            expr: Box::new(column("orders", "status")),
            params: vec![0, 1],
            negated: true,
        }],
        ..SelectQuery::default()
    };
    let sql = SqlRenderer::new(&PostgresDialect).render_select(&query);
    assert_eq!(
        sql,
        "SELECT \"orders\".\"id\" FROM \"orders\" WHERE \"orders\".\"status\" NOT IN ($1, $2)"
    );
}

#[test]
fn identifier_quoting_escapes_quote_characters() {
    assert_eq!(PostgresDialect.quote_ident("weird\"name"), "\"weird\"\"name\"");
    assert_eq!(MySqlDialect.quote_ident("weird`name"), "`weird``name`");
}

#[test]
fn median_differs_per_engine() {
    let pg = PostgresDialect.render_aggregation(AggregateFn::Median, "\"t\".\"v\"");
    assert_eq!(
        pg,
        "PERCENTILE_CONT(0.5) WITHIN GROUP (ORDER BY \"t\".\"v\")"
    );
    let my = MySqlDialect.render_aggregation(AggregateFn::Median, "`t`.`v`");
    assert!(my.contains("GROUP_CONCAT"));
    assert!(my.contains("SUBSTRING_INDEX"));
}
