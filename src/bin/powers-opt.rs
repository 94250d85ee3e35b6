use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use powers_opt::debug::{format_coo, format_f64};
use powers_opt::{cases, norm_inf, ConstrType, FuncType, HeurType, Network, Problem};

/// Power network optimization problem assembly.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble a problem over a reference case and print its summary
    Show(ShowArgs),

    /// List the reference cases and component types
    List,
}

#[derive(Copy, Clone, ValueEnum)]
enum VarSet {
    /// Power flow variables.
    Pf,
    /// Every quantity of every element.
    All,
}

#[derive(Args)]
struct ShowArgs {
    /// Reference case name.
    #[arg(long, default_value = "case3")]
    case: String,

    /// Number of time periods.
    #[arg(long, default_value_t = 1)]
    periods: usize,

    /// Variables to flag.
    #[arg(long, value_enum, default_value_t = VarSet::Pf)]
    vars: VarSet,

    /// Constraint types, comma separated.
    #[arg(long = "constr", value_delimiter = ',', default_value = "ACPF")]
    constrs: Vec<ConstrType>,

    /// Functions as NAME or NAME=WEIGHT, comma separated.
    #[arg(long = "func", value_delimiter = ',', value_parser = parse_func)]
    funcs: Vec<(FuncType, f64)>,

    /// Heuristics applied once at the initial point.
    #[arg(long = "heur", value_delimiter = ',')]
    heurs: Vec<HeurType>,

    /// Share generator outputs among co-located units before assembly.
    #[arg(long, default_value_t = false)]
    adjust_gens: bool,

    /// Print the network as JSON.
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Print the assembled matrices.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn parse_func(s: &str) -> Result<(FuncType, f64)> {
    let (name, weight) = match s.split_once('=') {
        Some((name, weight)) => (name, weight.parse()?),
        None => (s, 1.0),
    };
    Ok((name.parse()?, weight))
}

fn main() {
    env_logger::Builder::from_default_env()
        .format_level(false)
        .format_target(false)
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();

    match execute(&cli) {
        Ok(_) => {
            std::process::exit(0);
        }
        Err(err) => {
            eprintln!("error: {}", err);
            std::process::exit(2);
        }
    }
}

fn execute(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Show(args) => show(args),
        Commands::List => {
            println!("cases:       {}", cases::CASE_NAMES.join(", "));
            let names: Vec<&str> = ConstrType::ALL.iter().map(|c| c.name()).collect();
            println!("constraints: {}", names.join(", "));
            let names: Vec<&str> = FuncType::ALL.iter().map(|f| f.name()).collect();
            println!("functions:   {}", names.join(", "));
            println!("heuristics:  {}", HeurType::PvpqSwitching);
            Ok(())
        }
    }
}

fn show(args: &ShowArgs) -> Result<()> {
    let mut net: Network = cases::by_name(&args.case, args.periods)?;
    net.check()?;
    match args.vars {
        VarSet::Pf => cases::set_pf_vars(&mut net),
        VarSet::All => cases::set_all_vars(&mut net),
    }
    if args.adjust_gens {
        net.adjust_generators();
    }
    println!("{}", net);
    if args.json {
        println!("{}", net.json_string()?);
    }

    let mut p = Problem::new(&mut net);
    for &constr_type in &args.constrs {
        p.add_constr(constr_type);
    }
    for &(func_type, weight) in &args.funcs {
        p.add_func(func_type, weight);
    }
    for &heur_type in &args.heurs {
        p.add_heur(heur_type);
    }
    p.analyze();

    let mut x = p.init_point();
    if !args.heurs.is_empty() {
        p.apply_heuristics(&mut x)?;
    }
    p.eval(&x)?;
    let lambda = vec![1.0; p.f().len()];
    p.combine_h(&lambda, false)?;

    println!("{}", p);
    println!("  max |f|            : {}", format_f64(norm_inf(p.f())));
    if p.a().nnz() > 0 {
        let a = p.a().to_csr();
        let residual: Vec<f64> = (&a * &x).iter().zip(p.b()).map(|(ax, b)| ax - b).collect();
        println!("  max |Ax - b|       : {}", format_f64(norm_inf(&residual)));
    }

    let net = p.network();
    let props = net.properties();
    for t in 0..net.num_periods() {
        println!("  period {}", t);
        println!(
            "    gen P / load P   : {} / {}",
            format_f64(net.total_gen_p(t)),
            format_f64(net.total_load_p(t))
        );
        println!(
            "    gen Q / load Q   : {} / {}",
            format_f64(net.total_gen_q(t)),
            format_f64(net.total_load_q(t))
        );
        println!("    max |P mis|      : {}", format_f64(net.bus_p_mis(t)));
        println!("    max |Q mis|      : {}", format_f64(net.bus_q_mis(t)));
        println!("    gen v dev        : {}", format_f64(props.gen_v_dev[t]));
        println!(
            "    tran v/r/p vio   : {} / {} / {}",
            format_f64(props.tran_v_vio[t]),
            format_f64(props.tran_r_vio[t]),
            format_f64(props.tran_p_vio[t])
        );
        println!(
            "    shunt v/b vio    : {} / {}",
            format_f64(props.shunt_v_vio[t]),
            format_f64(props.shunt_b_vio[t])
        );
        println!("    control actions  : {}", props.num_actions[t]);
    }
    if args.verbose {
        println!("A =\n{}", format_coo(p.a()));
        println!("G =\n{}", format_coo(p.g()));
        println!("J =\n{}", format_coo(p.j()));
        println!("H =\n{}", format_coo(p.h_combined()));
    }
    Ok(())
}
