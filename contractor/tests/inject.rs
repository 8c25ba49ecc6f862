use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use contractor::{
    Arguments, Constructor, ConstructorInjection, Container, ContainerError, Factory, Identifier,
    Instance, Kind, Resolve, ResolverRef, StdError, Transient,
};

/// In-memory resolver that records every call made to it.
#[derive(Default)]
struct StubResolver {
    instances: Mutex<HashMap<Identifier, Instance>>,
    can_resolve_calls: AtomicUsize,
    resolved: Mutex<Vec<Identifier>>,
}

impl StubResolver {
    fn provide<T>(&self, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.instances
            .lock()
            .unwrap()
            .insert(Identifier::of::<T>(), Arc::new(value));
    }

    fn can_resolve_calls(&self) -> usize {
        self.can_resolve_calls.load(Ordering::SeqCst)
    }

    fn resolved(&self) -> Vec<Identifier> {
        self.resolved.lock().unwrap().clone()
    }
}

impl Resolve for StubResolver {
    fn can_resolve(&self, identifier: &Identifier) -> bool {
        self.can_resolve_calls.fetch_add(1, Ordering::SeqCst);
        self.instances.lock().unwrap().contains_key(identifier)
    }

    fn resolve(&self, identifier: &Identifier) -> Result<Instance, ContainerError> {
        self.resolved.lock().unwrap().push(identifier.clone());
        self.instances
            .lock()
            .unwrap()
            .get(identifier)
            .cloned()
            .ok_or_else(|| ContainerError::NotRegistered(identifier.clone()))
    }
}

#[derive(Debug, PartialEq)]
struct Report {
    built_by: &'static str,
    title: String,
    pages: i32,
}

fn report_constructors() -> Vec<Constructor<Report>> {
    vec![
        Constructor::new(vec![], |_| {
            Ok(Report {
                built_by: "empty",
                title: String::new(),
                pages: 0,
            })
        })
        .named("empty"),
        Constructor::new(vec![Kind::of::<String>()], |args| {
            Ok(Report {
                built_by: "titled",
                title: args.next::<String>()?,
                pages: 0,
            })
        })
        .named("titled"),
        Constructor::new(vec![Kind::of::<String>(), Kind::of::<i32>()], |args| {
            Ok(Report {
                built_by: "full",
                title: args.next::<String>()?,
                pages: args.next::<i32>()?,
            })
        })
        .named("full"),
    ]
}

fn construct_report(factory: &ConstructorInjection<Report>) -> Result<Report, ContainerError> {
    let instance = factory.construct()?;
    let report = instance.downcast::<Report>().unwrap();
    Ok(Arc::into_inner(report).unwrap())
}

#[test]
fn test_selects_richest_satisfiable_constructor() {
    let stub = Arc::new(StubResolver::default());
    stub.provide("Annual".to_string());
    stub.provide(12i32);
    let factory = ConstructorInjection::new(ResolverRef::new(&stub), report_constructors());

    assert_eq!(factory.kind(), Kind::of::<Report>());
    assert_eq!(
        construct_report(&factory).unwrap(),
        Report {
            built_by: "full",
            title: "Annual".to_string(),
            pages: 12,
        }
    );
    assert_eq!(factory.selected().unwrap().name(), "full");
}

#[test]
fn test_falls_back_to_smaller_constructor() {
    let stub = Arc::new(StubResolver::default());
    stub.provide("Quarterly".to_string());
    let factory = ConstructorInjection::new(ResolverRef::new(&stub), report_constructors());

    let report = construct_report(&factory).unwrap();

    assert_eq!(report.built_by, "titled");
    assert_eq!(report.title, "Quarterly");
}

#[test]
fn test_falls_back_to_parameterless_constructor() {
    let stub = Arc::new(StubResolver::default());
    stub.provide(12i32);
    let factory = ConstructorInjection::new(ResolverRef::new(&stub), report_constructors());

    assert_eq!(construct_report(&factory).unwrap().built_by, "empty");
    assert!(stub.resolved().is_empty());
}

#[test]
fn test_missing_dependencies() {
    let stub = Arc::new(StubResolver::default());
    let factory = ConstructorInjection::new(
        ResolverRef::new(&stub),
        vec![Constructor::new(vec![Kind::of::<String>()], |args| {
            Ok(Report {
                built_by: "titled",
                title: args.next::<String>()?,
                pages: 0,
            })
        })],
    );

    let err = factory.construct().unwrap_err();

    assert!(matches!(&err, ContainerError::MissingDependencies(kind) if *kind == Kind::of::<Report>()));
    assert!(err.to_string().contains(Kind::of::<Report>().name()));
    assert!(factory.selected().is_none());
    assert!(stub.resolved().is_empty());

    // A failed selection is retried once the dependency shows up.
    stub.provide("Late".to_string());
    assert_eq!(construct_report(&factory).unwrap().title, "Late");
}

#[test]
fn test_empty_constructor_table() {
    let stub = Arc::new(StubResolver::default());
    let factory = ConstructorInjection::<Report>::new(ResolverRef::new(&stub), vec![]);

    assert!(matches!(
        factory.construct(),
        Err(ContainerError::MissingDependencies(_))
    ));
}

#[test]
fn test_selection_is_memoized() {
    let stub = Arc::new(StubResolver::default());
    stub.provide("Monthly".to_string());
    stub.provide(3i32);
    let factory = ConstructorInjection::new(ResolverRef::new(&stub), report_constructors());

    construct_report(&factory).unwrap();
    let calls = stub.can_resolve_calls();
    assert!(calls > 0);

    for _ in 0..5 {
        assert_eq!(construct_report(&factory).unwrap().built_by, "full");
    }
    assert_eq!(stub.can_resolve_calls(), calls);
    assert_eq!(stub.resolved().len(), 2 * 6);
}

#[test]
fn test_arguments_resolved_in_declaration_order() {
    let stub = Arc::new(StubResolver::default());
    stub.provide("Weekly".to_string());
    stub.provide(1i32);
    let factory = ConstructorInjection::new(ResolverRef::new(&stub), report_constructors());

    construct_report(&factory).unwrap();

    assert_eq!(
        stub.resolved(),
        vec![Identifier::of::<String>(), Identifier::of::<i32>()]
    );
}

/// Resolver that claims everything but cannot produce anything.
struct LyingResolver;

impl Resolve for LyingResolver {
    fn can_resolve(&self, _identifier: &Identifier) -> bool {
        true
    }

    fn resolve(&self, identifier: &Identifier) -> Result<Instance, ContainerError> {
        Err(ContainerError::NotRegistered(identifier.clone()))
    }
}

#[test]
fn test_resolution_error_propagates_unchanged() {
    let resolver = Arc::new(LyingResolver);
    let factory = ConstructorInjection::new(ResolverRef::new(&resolver), report_constructors());

    match factory.construct() {
        Err(ContainerError::NotRegistered(identifier)) => {
            assert_eq!(identifier, Identifier::of::<String>());
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("construction should fail"),
    }
}

#[test]
fn test_equal_arity_prefers_declaration_order() {
    let stub = Arc::new(StubResolver::default());
    stub.provide("Daily".to_string());
    stub.provide(7i32);
    let constructors = vec![
        Constructor::new(vec![Kind::of::<i32>()], |args| {
            Ok(Report {
                built_by: "pages",
                title: String::new(),
                pages: args.next::<i32>()?,
            })
        }),
        Constructor::new(vec![Kind::of::<String>()], |args| {
            Ok(Report {
                built_by: "title",
                title: args.next::<String>()?,
                pages: 0,
            })
        }),
    ];
    let factory = ConstructorInjection::new(ResolverRef::new(&stub), constructors);

    assert_eq!(construct_report(&factory).unwrap().built_by, "pages");
}

#[test]
fn test_constructor_failure() {
    let stub = Arc::new(StubResolver::default());
    let factory = ConstructorInjection::new(
        ResolverRef::new(&stub),
        vec![Constructor::<Report>::new(vec![], |_| {
            Err::<Report, StdError>("out of paper".into())
        })],
    );

    let err = factory.construct().unwrap_err();

    assert!(matches!(err, ContainerError::ConstructionFailed(_)));
    assert_eq!(err.to_string(), "Construction failed: out of paper");
}

#[test]
fn test_constructor_reading_wrong_argument_type() {
    let stub = Arc::new(StubResolver::default());
    stub.provide(5i32);
    let factory = ConstructorInjection::new(
        ResolverRef::new(&stub),
        vec![Constructor::new(vec![Kind::of::<i32>()], |args| {
            Ok(Report {
                built_by: "confused",
                title: args.next::<String>()?,
                pages: 0,
            })
        })],
    );

    assert!(matches!(
        factory.construct(),
        Err(ContainerError::InvalidArgument(_))
    ));
}

#[test]
fn test_arguments_cursor() {
    let mut args = Arguments::new(vec![
        (Identifier::of::<i32>(), Arc::new(4i32) as Instance),
        (
            Identifier::of::<String>(),
            Arc::new("four".to_string()) as Instance,
        ),
    ]);
    assert_eq!(args.len(), 2);

    assert_eq!(args.next::<i32>().unwrap(), 4);
    assert_eq!(args.next_arc::<String>().unwrap().as_str(), "four");
    assert!(args.is_empty());
    assert!(matches!(
        args.next::<i32>(),
        Err(ContainerError::InvalidArgument(_))
    ));
}

#[test]
fn test_dropped_container_reports_missing_dependencies() {
    let container = Arc::new(Container::new());
    let mut constructors = report_constructors();
    constructors.retain(|constructor| !constructor.parameters().is_empty());
    let factory = ConstructorInjection::new(container.resolver(), constructors);
    drop(container);

    assert!(matches!(
        factory.construct(),
        Err(ContainerError::MissingDependencies(_))
    ));
}

#[test]
fn test_dropped_container_still_allows_parameterless_constructor() {
    let container = Arc::new(Container::new());
    let factory = ConstructorInjection::new(container.resolver(), report_constructors());
    drop(container);

    assert_eq!(construct_report(&factory).unwrap().built_by, "empty");
}

#[test]
fn test_transient_vector_of_configured_length() {
    let container = Arc::new(Container::new());
    container
        .register(
            Identifier::of::<i32>(),
            contractor::ContainerLifetime::new(contractor::FnFactory::new(|| {
                Ok::<_, StdError>(10i32)
            })),
        )
        .unwrap();
    let factory = ConstructorInjection::new(
        container.resolver(),
        vec![
            Constructor::new(vec![], |_| Ok(Vec::<String>::new())),
            Constructor::new(vec![Kind::of::<i32>()], |args| {
                let len = args.next::<i32>()?;
                Ok(vec![String::new(); len as usize])
            }),
        ],
    );
    container
        .register(Identifier::of::<Vec<String>>(), Transient::new(factory))
        .unwrap();

    let first = container.resolve(&Identifier::of::<Vec<String>>()).unwrap();
    let second = container.resolve(&Identifier::of::<Vec<String>>()).unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(first.downcast_ref::<Vec<String>>().unwrap().len(), 10);
    assert_eq!(second.downcast_ref::<Vec<String>>().unwrap().len(), 10);
}
