use clap::Parser;
use dotnet_access::{
    assemblies::load_assembly,
    config::DEFAULT_HIERARCHY_DEPTH,
    resolver::MemberResolver,
    types::{
        MetadataExt, MetadataProvider, ResolvedDebug, TypeDescription,
        members::MemberDescription,
    },
};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "List the members of a type the way the resolver sees them"
)]
struct Args {
    /// Path to the assembly to load
    assembly: String,
    /// Full name of the type (e.g. Namespace.Outer+Inner)
    type_name: String,
    /// Resolve a single member by name instead of listing all of them
    #[arg(short, long)]
    member: Option<String>,
    /// Ignore members inherited from base types
    #[arg(short, long)]
    declared: bool,
}

fn describe(resolver: &MemberResolver<'_>, member: &MemberDescription) -> String {
    let metadata = resolver.metadata();
    let kind = match member {
        MemberDescription::Field(_) => "field",
        MemberDescription::Property(_) => "property",
        MemberDescription::Method(_) => "method",
        MemberDescription::Constructor(_) => "constructor",
    };
    let underlying = resolver
        .underlying_type(member)
        .map_or_else(|| "-".to_string(), |t| metadata.type_name(t));
    format!(
        "{kind:<12} {}{} : {underlying} (declared on {})",
        if resolver.is_static(member) { "static " } else { "" },
        member.name(metadata).unwrap_or("?"),
        metadata.type_name(member.declaring_type())
    )
}

fn lookup(
    resolver: &MemberResolver<'_>,
    ty: TypeDescription,
    name: &str,
    declared: bool,
) -> Result<Vec<MemberDescription>, String> {
    let mut found: Vec<MemberDescription> = vec![];
    let field = if declared { resolver.declared_field(ty, name) } else { resolver.field(ty, name) };
    found.extend(field.map(MemberDescription::Field));
    let property = if declared {
        resolver.declared_property(ty, name)
    } else {
        resolver.property(ty, name)
    };
    found.extend(property.map(MemberDescription::Property));
    let method = if declared {
        resolver.declared_method(ty, name, None, None)
    } else {
        resolver.method(ty, name, None, None)
    };
    found.extend(method.map_err(|e| e.to_string())?.map(MemberDescription::Method));
    Ok(found)
}

fn list(resolver: &MemberResolver<'_>, ty: TypeDescription, declared: bool) {
    let metadata = resolver.metadata();
    let mut owners = vec![ty];
    if !declared {
        owners.extend(metadata.ancestors(ty, DEFAULT_HIERARCHY_DEPTH).skip(1));
    }
    for owner in owners {
        println!("{}:", metadata.type_name(owner));
        let members = resolver
            .declared_fields(owner)
            .into_iter()
            .map(MemberDescription::Field)
            .chain(resolver.declared_properties(owner).into_iter().map(MemberDescription::Property))
            .chain(resolver.declared_constructors(owner, None).into_iter().map(MemberDescription::Constructor))
            .chain(resolver.declared_methods(owner).into_iter().map(MemberDescription::Method));
        for member in members {
            println!("  {}", describe(resolver, &member));
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let registry = match load_assembly(&args.assembly) {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let resolver = MemberResolver::new(&registry);
    let Some(ty) = resolver.type_by_name(&args.type_name) else {
        eprintln!("Type '{}' not found in {}", args.type_name, args.assembly);
        return ExitCode::FAILURE;
    };

    match &args.member {
        Some(name) => match lookup(&resolver, ty, name, args.declared) {
            Ok(found) if found.is_empty() => {
                eprintln!("{} has no member named {name}", registry.type_name(ty));
                ExitCode::FAILURE
            }
            Ok(found) => {
                for member in &found {
                    println!("{}", describe(&resolver, member));
                    if let MemberDescription::Method(m) = member {
                        println!("  {}", m.show(&registry));
                    }
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{e}");
                ExitCode::FAILURE
            }
        },
        None => {
            println!("{} types loaded", registry.type_count());
            list(&resolver, ty, args.declared);
            ExitCode::SUCCESS
        }
    }
}
