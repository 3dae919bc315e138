use document::{FieldPath, Gvk, IndexedField};
use rescache::{
    Cache, CacheOptions, Factory, FactoryOptions, Filter, ListOptions, Op, OrFilter, Pagination,
    Partition, Sort, SortOrder,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};

fn path(p: &str) -> FieldPath {
    FieldPath::parse(p).unwrap()
}

fn indirect_fields() -> Vec<String> {
    [
        "management.example.io/v3",
        "Project",
        "metadata.name",
        "spec.displayName",
    ]
    .map(String::from)
    .to_vec()
}

fn names(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .map(|doc| document::name_of(doc).to_string())
        .collect()
}

/// Projects with display names, and pods referencing them both by an
/// indexed field and by a label. One pod references nothing.
fn fixture() -> (Factory, Cache) {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    let name = format!("indirect-test-{}", NEXT.fetch_add(1, Ordering::Relaxed));
    let factory = Factory::new(sqldb::Location::InMemory(name), FactoryOptions::default()).unwrap();

    let projects = factory
        .open(
            Gvk::new("management.example.io", "v3", "Project"),
            CacheOptions {
                namespaced: false,
                fields: vec![IndexedField::new(path("spec.displayName"))],
                ..Default::default()
            },
        )
        .unwrap();
    for (name, display) in [("p-alpha", "Alpha"), ("p-zeta", "Zeta")] {
        projects
            .add(&json!({
                "metadata": {"name": name, "resourceVersion": "1"},
                "spec": {"displayName": display},
            }))
            .unwrap();
    }

    let pods = factory
        .open(
            Gvk::new("", "v1", "Pod"),
            CacheOptions {
                fields: vec![IndexedField::new(path("spec.projectId"))],
                ..Default::default()
            },
        )
        .unwrap();
    for (name, project) in [("pod-a", "p-alpha"), ("pod-z", "p-zeta")] {
        pods.add(&json!({
            "metadata": {
                "namespace": "ns1",
                "name": name,
                "resourceVersion": "2",
                "labels": {"project": project},
            },
            "spec": {"projectId": project},
        }))
        .unwrap();
    }
    pods.add(&json!({
        "metadata": {"namespace": "ns1", "name": "pod-none", "resourceVersion": "3"},
        "spec": {},
    }))
    .unwrap();

    (factory, pods)
}

#[tokio::test]
async fn indirect_filter_matches_through_external_table() {
    let (_factory, pods) = fixture();

    let result = pods
        .list_by_options(
            &ListOptions {
                filters: vec![OrFilter::new(vec![Filter::new(
                    path("spec.projectId"),
                    Op::Eq,
                    vec!["Alpha".to_string()],
                )
                .indirect(indirect_fields())])],
                ..Default::default()
            },
            &[Partition::passthrough()],
            "",
        )
        .unwrap();

    assert_eq!(names(&result.items), vec!["pod-a"]);
}

#[tokio::test]
async fn indirect_label_filter_matches_through_label_value() {
    let (_factory, pods) = fixture();

    let result = pods
        .list_by_options(
            &ListOptions {
                filters: vec![OrFilter::new(vec![Filter::new(
                    path("metadata.labels.project"),
                    Op::Eq,
                    vec!["Zeta".to_string()],
                )
                .indirect(indirect_fields())])],
                ..Default::default()
            },
            &[Partition::passthrough()],
            "",
        )
        .unwrap();

    assert_eq!(names(&result.items), vec!["pod-z"]);
}

#[tokio::test]
async fn indirect_sort_orders_by_external_field() {
    let (_factory, pods) = fixture();

    let result = pods
        .list_by_options(
            &ListOptions {
                sort_list: vec![
                    Sort::new(path("spec.projectId"), SortOrder::Asc).indirect(indirect_fields()),
                    Sort::new(path("metadata.name"), SortOrder::Asc),
                ],
                ..Default::default()
            },
            &[Partition::passthrough()],
            "",
        )
        .unwrap();

    // Alpha, Zeta, then the unreferenced pod (NULL sorts last).
    assert_eq!(names(&result.items), vec!["pod-a", "pod-z", "pod-none"]);
}

#[tokio::test]
async fn indirect_label_sort_spans_labeled_and_unlabeled() {
    let (_factory, pods) = fixture();

    let options = |order: SortOrder| ListOptions {
        sort_list: vec![
            Sort::new(path("metadata.labels.project"), order).indirect(indirect_fields()),
            Sort::new(path("metadata.name"), SortOrder::Asc),
        ],
        ..Default::default()
    };

    let ascending = pods
        .list_by_options(&options(SortOrder::Asc), &[Partition::passthrough()], "")
        .unwrap();
    assert_eq!(names(&ascending.items), vec!["pod-a", "pod-z", "pod-none"]);

    let descending = pods
        .list_by_options(&options(SortOrder::Desc), &[Partition::passthrough()], "")
        .unwrap();
    assert_eq!(names(&descending.items), vec!["pod-none", "pod-z", "pod-a"]);
}

#[tokio::test]
async fn indirect_label_sort_paginates_across_branches() {
    let (_factory, pods) = fixture();

    let mut options = ListOptions {
        sort_list: vec![
            Sort::new(path("metadata.labels.project"), SortOrder::Asc).indirect(indirect_fields()),
            Sort::new(path("metadata.name"), SortOrder::Asc),
        ],
        pagination: Pagination {
            page_size: 2,
            page: 0,
        },
        ..Default::default()
    };

    let first = pods
        .list_by_options(&options, &[Partition::passthrough()], "")
        .unwrap();
    assert_eq!(names(&first.items), vec!["pod-a", "pod-z"]);
    assert_eq!(first.total, 3);
    assert_eq!(first.continue_token, "2");

    options.resume = first.continue_token;
    let second = pods
        .list_by_options(&options, &[Partition::passthrough()], "")
        .unwrap();
    assert_eq!(names(&second.items), vec!["pod-none"]);
    assert_eq!(second.continue_token, "");
}
