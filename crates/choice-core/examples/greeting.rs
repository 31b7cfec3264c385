use choice_core::{
    init_tracing, kwargs, trace_start, trace_stop, Registry, SelectorSpec, Signature, SelectorPoset, Value,
};

fn main() -> anyhow::Result<()> {
    init_tracing();

    let registry = Registry::default();
    let greet = registry.func(
        "greet",
        Signature::new().param("name").with_default("greeting", "Hello"),
        &["greeting"],
        |args| Ok(Value::from(format!("{} {}", args.str("greeting")?, args.str("name")?))),
    )?;
    let formal = registry.implementation(
        &greet,
        "formal_greet",
        Signature::new()
            .param("name")
            .with_default("greeting", "Good day")
            .with_default("title", "Dr."),
        &["greeting", "title"],
        |args| {
            Ok(Value::from(format!(
                "{}, {} {}.",
                args.str("greeting")?,
                args.str("title")?,
                args.str("name")?
            )))
        },
    )?;

    let app = registry.callable("my_app");
    let email = registry.callable("email_module");
    let formal_context = registry.context("Formal");

    let rules = [
        (vec!["my_app".into(), "greet".into()], None, kwargs([("greeting", "Hi")])),
        (
            vec!["my_app".into(), "email_module".into(), "greet".into()],
            None,
            kwargs([("greeting", "Dear")]),
        ),
        (
            vec![SelectorSpec::context("Formal"), "greet".into()],
            Some(&formal),
            kwargs([("title", "Prof.")]),
        ),
    ];
    let mut selectors = Vec::new();
    for (specs, implementation, overrides) in rules {
        let selector = registry.selector(&specs)?;
        selectors.push(selector.clone());
        registry.rule(selector, implementation, overrides)?;
    }

    trace_start();
    app.call(|| -> anyhow::Result<()> {
        println!("{}", greet.call(vec![Value::from("Ada")])?);
        email.call(|| -> anyhow::Result<()> {
            println!("{}", greet.call(vec![Value::from("Grace")])?);
            formal_context.scope(|| -> anyhow::Result<()> {
                println!("{}", greet.call(vec![Value::from("Barbara")])?);
                Ok(())
            })
        })
    })?;
    let trace = trace_stop();

    println!("\n=== Trace ===\n{trace}");
    println!("=== Selector poset ===\n{}", SelectorPoset::build(&selectors));
    Ok(())
}
