use std::{env, fs, process::ExitCode, time::Instant};

use replica::{
    ClassBuilder, CopyError, Heap, HeapId, LimitedTracker, ListKind, NoLimitTracker, ProfilingTracer, RecordingTracer,
    ResourceLimits, ResourceTracker, StderrTracer, Value, ValueType, deep_copy, deep_copy_with_tracer,
};

const USAGE: &str = "usage: replica [--trace | --json-trace] [--profile] [--limits <file.json>]";

#[derive(Debug, Default)]
struct Options {
    trace: bool,
    json_trace: bool,
    profile: bool,
    limits: Option<String>,
}

fn main() -> ExitCode {
    let options = match parse_args(env::args().skip(1)) {
        Ok(options) => options,
        Err(err) => {
            eprintln!("error: {err}\n{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    let result = match &options.limits {
        Some(path) => match read_limits(path) {
            Ok(limits) => run(&mut Heap::new(16, LimitedTracker::new(limits)), &options),
            Err(err) => Err(err),
        },
        None => run(&mut Heap::new(16, NoLimitTracker), &options),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Options, String> {
    let mut options = Options::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--trace" => options.trace = true,
            "--json-trace" => options.json_trace = true,
            "--profile" => options.profile = true,
            "--limits" => {
                let path = args.next().ok_or("--limits requires a file path")?;
                options.limits = Some(path);
            }
            other => return Err(format!("unknown argument `{other}`")),
        }
    }
    Ok(options)
}

fn read_limits(file_path: &str) -> Result<ResourceLimits, String> {
    let json = fs::read_to_string(file_path).map_err(|err| format!("reading {file_path}: {err}"))?;
    ResourceLimits::from_json(&json).map_err(|err| format!("parsing {file_path}: {err}"))
}

/// Defines `Man` with an initializer that validates its arguments.
fn define_man(heap: &mut Heap<impl ResourceTracker>) -> Result<HeapId, String> {
    let builder = ClassBuilder::new("Man")
        .field("name", ValueType::Object)
        .field("age", ValueType::Int)
        .field("favoriteBooks", ValueType::Object)
        .allow_bare_alloc()
        .initializer(|init| {
            let age = init.arg(1)?;
            if age.as_int().is_none_or(|age| age < 0) {
                return Err("age must be a non-negative int".to_owned());
            }
            init.set("name", init.arg(0)?)?;
            init.set("age", age)?;
            init.set("favoriteBooks", init.arg(2)?)
        });
    heap.define_class(builder).map_err(|err| err.to_string())
}

fn run<T: ResourceTracker>(heap: &mut Heap<T>, options: &Options) -> Result<(), String> {
    let man = define_man(heap)?;
    let str_value = |heap: &mut Heap<T>, text: &str| heap.str_value(text).map_err(|err| err.to_string());

    let name = str_value(heap, "John")?;
    let books = vec![str_value(heap, "Book1")?, str_value(heap, "Book2")?];
    let books = heap
        .new_list(ListKind::ArrayList, books)
        .map_err(|err| err.to_string())?;
    let original = heap
        .instantiate(man, &[name, Value::Int(30), Value::Ref(books)])
        .map_err(|err| err.to_string())?;

    let before = heap.heap_stats();
    let start = Instant::now();
    let result = copy(heap, Value::Ref(original), options);
    let elapsed = start.elapsed();
    if options.trace || options.json_trace || options.profile {
        let outcome = if result.is_ok() { "copied" } else { "rolled back" };
        eprintln!("{outcome} in {elapsed:?}: {}", before.diff(&heap.heap_stats()));
    }
    let copied = result.map_err(|err| err.to_string())?;
    let copied_id = copied.ref_id().ok_or("copy of an instance is not a reference")?;

    println!("Original man: {}", Value::Ref(original).repr(&*heap));
    println!("Copied man: {}", copied.repr(&*heap));

    println!("\nChanging original man's name to Bob");
    let bob = str_value(heap, "Bob")?;
    heap.set_field(original, "name", bob).map_err(|err| err.to_string())?;
    let field = |heap: &Heap<T>, id: HeapId, name: &str| heap.get_field(id, name).map_err(|err| err.to_string());
    println!("Original man's name: {}", field(&*heap, original, "name")?.repr(&*heap));
    println!("Copied man's name: {}", field(&*heap, copied_id, "name")?.repr(&*heap));

    println!("\nAdding 'Book3' to original man's favorite books");
    let book3 = str_value(heap, "Book3")?;
    heap.list_push(books, book3).map_err(|err| err.to_string())?;
    println!(
        "Original man's favorite books: {}",
        field(&*heap, original, "favoriteBooks")?.repr(&*heap)
    );
    println!(
        "Copied man's favorite books: {}",
        field(&*heap, copied_id, "favoriteBooks")?.repr(&*heap)
    );
    Ok(())
}

fn copy(heap: &mut Heap<impl ResourceTracker>, root: Value, options: &Options) -> Result<Value, CopyError> {
    if options.trace {
        deep_copy_with_tracer(heap, root, &mut StderrTracer::new())
    } else if options.json_trace {
        let mut tracer = RecordingTracer::new();
        let result = deep_copy_with_tracer(heap, root, &mut tracer);
        for event in tracer.events() {
            match serde_json::to_string(event) {
                Ok(line) => eprintln!("{line}"),
                Err(err) => eprintln!("error: serializing trace event: {err}"),
            }
        }
        result
    } else if options.profile {
        let mut tracer = ProfilingTracer::new();
        let result = deep_copy_with_tracer(heap, root, &mut tracer);
        eprintln!("{}", tracer.report());
        result
    } else {
        deep_copy(heap, root)
    }
}
