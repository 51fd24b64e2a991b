use criterion::{black_box, criterion_group, criterion_main, Criterion};
use quel_sql::{compile, ColumnDef, MappingSchema, Parser};

const SIMPLE_RETRIEVE: &str = "range of p is Product; retrieve (p.id, p.name)";

const MEDIUM_RETRIEVE: &str = "\
range of p is Product; \
range of o is OrderLine via o.productId = p.id; \
retrieve unique (p.id, p.name, total = p.price) \
where p.stock > 0 and (p.price < :max or p.name = \"Jo*n\") \
sort by total desc, p.name";

const COMPLEX_RETRIEVE: &str = "\
range of p is Product; \
range of o is OrderLine via o.productId = p.id; \
retrieve (p, count(o), lines = ucount(o.id)) \
where search(p.name, p.description, \"apple +fresh -rotten\") \
  and p.price in (1, 2, :three) \
  and is_empty(p.description) \
  or not p.stock = 0 \
sort by p.price desc, p.name asc, lines";

fn schema() -> MappingSchema {
    MappingSchema::new()
        .with_entity(
            "Product",
            "products",
            vec![
                ColumnDef::new("id", "product_id").numeric().identifier(),
                ColumnDef::new("name", "name"),
                ColumnDef::new("description", "description").nullable(),
                ColumnDef::new("price", "unit_price").numeric().nullable(),
                ColumnDef::new("stock", "stock").numeric(),
            ],
        )
        .with_entity(
            "OrderLine",
            "order_lines",
            vec![
                ColumnDef::new("id", "line_id").numeric().identifier(),
                ColumnDef::new("productId", "product_id").numeric(),
                ColumnDef::new("quantity", "quantity").numeric(),
            ],
        )
}

fn bench_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("parsing");

    group.bench_function("simple", |b| {
        b.iter(|| Parser::parse(black_box(SIMPLE_RETRIEVE)).unwrap())
    });
    group.bench_function("medium", |b| {
        b.iter(|| Parser::parse(black_box(MEDIUM_RETRIEVE)).unwrap())
    });
    group.bench_function("complex", |b| {
        b.iter(|| Parser::parse(black_box(COMPLEX_RETRIEVE)).unwrap())
    });

    group.finish();
}

fn bench_compile(c: &mut Criterion) {
    let schema = schema();
    let mut group = c.benchmark_group("compile");

    group.bench_function("simple", |b| {
        b.iter(|| compile(black_box(SIMPLE_RETRIEVE), &schema).unwrap())
    });
    group.bench_function("medium", |b| {
        b.iter(|| compile(black_box(MEDIUM_RETRIEVE), &schema).unwrap())
    });
    group.bench_function("complex", |b| {
        b.iter(|| compile(black_box(COMPLEX_RETRIEVE), &schema).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_parsing, bench_compile);
criterion_main!(benches);
