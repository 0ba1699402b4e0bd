#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    if let Err(err) = native::run() {
        eprintln!("sdef_cli error: {err}");
        std::process::exit(1);
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use sdef_engine::deform::{
        BindDiagnostics, BindOptions, DeformDiagnostics, bind, decode_bind_data, deform,
        encode_bind_data,
    };
    use sdef_engine::geom::{GeomMetrics, Point3, PolyMesh, TimingBucket, Vec3};
    use std::f64::consts::PI;
    use std::fs::{self, File};
    use std::io::{BufWriter, Write};
    use std::path::{Path, PathBuf};

    const USAGE: &str = r#"sdef_cli (sdef-engine)

USAGE:
  sdef_cli list
  sdef_cli run <scenario|all> [options]

SCENARIOS:
  wave_sheet
  bend_strip
  twist_box
  persist_wave

OPTIONS (run):
  --out-dir <dir>    Write <scenario>.obj to this dir (required for `all`)
  --obj <path>       Write OBJ (single scenario only)
  --overwrite        Overwrite existing output files
  -h, --help         Show this help
"#;

    pub fn run() -> Result<(), String> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let mut args = Args::new(args);

        let Some(command) = args.next() else {
            print_usage();
            return Ok(());
        };

        match command.as_str() {
            "list" => {
                print_scenarios();
                Ok(())
            }
            "run" => cmd_run(&mut args),
            "-h" | "--help" | "help" => {
                print_usage();
                Ok(())
            }
            other => Err(format!("unknown command `{other}`\n\n{USAGE}")),
        }
    }

    fn print_usage() {
        println!("{USAGE}");
    }

    fn print_scenarios() {
        for scenario in Scenario::ALL {
            println!("{}", scenario.name());
        }
    }

    fn cmd_run(args: &mut Args) -> Result<(), String> {
        let scenario_name = args.next().ok_or("missing scenario name")?;

        let mut out_dir: Option<PathBuf> = None;
        let mut obj_path: Option<PathBuf> = None;
        let mut overwrite = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--out-dir" => out_dir = Some(PathBuf::from(args.value("--out-dir")?)),
                "--obj" => obj_path = Some(PathBuf::from(args.value("--obj")?)),
                "--overwrite" => overwrite = true,
                "-h" | "--help" => {
                    print_usage();
                    return Ok(());
                }
                other => return Err(format!("unknown option `{other}`\n\n{USAGE}")),
            }
        }

        if let Some(dir) = out_dir.as_ref() {
            if obj_path.is_some() {
                return Err("use either --out-dir or --obj (not both)".to_string());
            }
            fs::create_dir_all(dir).map_err(|e| format!("create out dir: {e}"))?;

            if scenario_name == "all" {
                for scenario in Scenario::ALL {
                    let path = dir.join(format!("{}.obj", scenario.name()));
                    run_one_scenario(*scenario, Some(path.as_path()), overwrite)?;
                }
                return Ok(());
            }

            let scenario = Scenario::from_str(&scenario_name).ok_or_else(|| unknown_scenario(&scenario_name))?;
            let path = dir.join(format!("{}.obj", scenario.name()));
            return run_one_scenario(scenario, Some(path.as_path()), overwrite);
        }

        if scenario_name == "all" {
            return Err("`run all` requires --out-dir".to_string());
        }

        let scenario = Scenario::from_str(&scenario_name).ok_or_else(|| unknown_scenario(&scenario_name))?;
        run_one_scenario(scenario, obj_path.as_deref(), overwrite)
    }

    fn run_one_scenario(scenario: Scenario, obj: Option<&Path>, overwrite: bool) -> Result<(), String> {
        let output = run_scenario(scenario)?;

        if let Some(path) = obj {
            write_obj_file(path, &output.mesh, output.name, overwrite)?;
            eprintln!("wrote {}", path.display());
        }

        let (bind_diag, deform_diag) = (&output.bind, &output.deform);
        println!(
            "{}: bound={}/{} binds(ngon={} tri={} centroid={}) deformed={} max_disp={:.6}",
            output.name,
            bind_diag.bound_vertex_count,
            bind_diag.source_vertex_count,
            bind_diag.ngon_binds,
            bind_diag.triangle_binds,
            bind_diag.centroid_binds,
            deform_diag.deformed_vertices,
            deform_diag.max_displacement
        );
        if let Some(timing) = bind_diag.timing.as_ref() {
            eprintln!("  bind timing: {:.3} ms", timing.total_ms());
        }

        Ok(())
    }

    fn unknown_scenario(name: &str) -> String {
        let mut msg = format!("unknown scenario `{name}`\n\navailable scenarios:\n");
        for scenario in Scenario::ALL {
            msg.push_str(&format!("  {}\n", scenario.name()));
        }
        msg
    }

    fn write_obj_file(path: &Path, mesh: &PolyMesh, name: &str, overwrite: bool) -> Result<(), String> {
        if path.exists() && !overwrite {
            return Err(format!(
                "refusing to overwrite existing file {} (use --overwrite)",
                path.display()
            ));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| format!("create dir {}: {e}", parent.display()))?;
        }

        let file = File::create(path).map_err(|e| format!("create {}: {e}", path.display()))?;
        let mut w = BufWriter::new(file);

        writeln!(w, "# sdef-engine sdef_cli").map_err(|e| format!("write obj: {e}"))?;
        writeln!(w, "o {name}").map_err(|e| format!("write obj: {e}"))?;

        for p in mesh.positions() {
            writeln!(w, "v {} {} {}", p.x, p.y, p.z).map_err(|e| format!("write obj: {e}"))?;
        }

        for face in 0..mesh.face_count() {
            let mut line = String::from("f");
            for corner in mesh.face_corners(face) {
                line.push_str(&format!(" {}", corner.vert + 1));
            }
            writeln!(w, "{line}").map_err(|e| format!("write obj: {e}"))?;
        }

        w.flush().map_err(|e| format!("flush {}: {e}", path.display()))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Scenarios
    // ─────────────────────────────────────────────────────────────────────

    #[derive(Debug, Clone, Copy)]
    enum Scenario {
        WaveSheet,
        BendStrip,
        TwistBox,
        PersistWave,
    }

    impl Scenario {
        const ALL: &'static [Scenario] = &[
            Scenario::WaveSheet,
            Scenario::BendStrip,
            Scenario::TwistBox,
            Scenario::PersistWave,
        ];

        fn name(self) -> &'static str {
            match self {
                Scenario::WaveSheet => "wave_sheet",
                Scenario::BendStrip => "bend_strip",
                Scenario::TwistBox => "twist_box",
                Scenario::PersistWave => "persist_wave",
            }
        }

        fn from_str(name: &str) -> Option<Self> {
            Self::ALL.iter().copied().find(|s| s.name() == name)
        }
    }

    struct ScenarioOutput {
        name: &'static str,
        mesh: PolyMesh,
        bind: BindDiagnostics,
        deform: DeformDiagnostics,
    }

    fn run_scenario(scenario: Scenario) -> Result<ScenarioOutput, String> {
        match scenario {
            Scenario::WaveSheet => {
                let cage = grid_mesh(4, 4, 1.0, 0.0)?;
                let source = grid_mesh(24, 24, 4.0 / 24.0, 0.25)?;
                let deformed = map_positions(&cage, |p| Point3::new(p.x, p.y, 0.4 * (p.x * PI / 2.0).sin()));
                wrap(scenario.name(), source, &cage, &deformed)
            }
            Scenario::BendStrip => {
                let cage = grid_mesh(8, 1, 1.0, 0.0)?;
                let source = grid_mesh(32, 4, 0.25, 0.1)?;
                // Roll the strip onto a cylinder of radius 8 / PI around the Y axis.
                let radius = 8.0 / PI;
                let deformed = map_positions(&cage, |p| {
                    let angle = p.x / radius;
                    Point3::new(radius * angle.sin(), p.y, radius - radius * angle.cos() + p.z)
                });
                wrap(scenario.name(), source, &cage, &deformed)
            }
            Scenario::TwistBox => {
                let cage = cube_mesh(1, 1.0)?;
                let source = cube_mesh(6, 0.8)?;
                let deformed = map_positions(&cage, |p| {
                    let angle = p.z * PI / 4.0;
                    let (s, c) = angle.sin_cos();
                    Point3::new(p.x * c - p.y * s, p.x * s + p.y * c, p.z)
                });
                wrap(scenario.name(), source, &cage, &deformed)
            }
            Scenario::PersistWave => {
                let cage = grid_mesh(4, 4, 1.0, 0.0)?;
                let mut source = grid_mesh(12, 12, 4.0 / 12.0, -0.2)?;
                let (data, bind_diag) = bind(source.positions(), &cage, &BindOptions::new().with_target_name("cage"))
                    .map_err(|e| e.to_string())?;

                let mut metrics = GeomMetrics::default();
                metrics.begin();
                let data = metrics.time(TimingBucket::Persist, || {
                    let mut bytes = Vec::new();
                    encode_bind_data(&data, &mut bytes)?;
                    decode_bind_data(&mut bytes.as_slice())
                })
                .map_err(|e| e.to_string())?;
                if let Some(report) = metrics.end() {
                    eprintln!("  persist: {} ns", report.persist_ns);
                }

                let deformed = map_positions(&cage, |p| p + Vec3::new(0.0, 0.0, 0.5 * p.y));
                let mut positions = source.positions().to_vec();
                let deform_diag = deform(&data, &deformed, &mut positions, 1.0, None).map_err(|e| e.to_string())?;
                source.set_positions(positions).map_err(|e| e.to_string())?;
                Ok(ScenarioOutput {
                    name: scenario.name(),
                    mesh: source,
                    bind: bind_diag,
                    deform: deform_diag,
                })
            }
        }
    }

    fn wrap(
        name: &'static str,
        mut source: PolyMesh,
        cage: &PolyMesh,
        deformed: &PolyMesh,
    ) -> Result<ScenarioOutput, String> {
        let (data, bind_diag) = bind(source.positions(), cage, &BindOptions::new().with_target_name("cage"))
            .map_err(|e| e.to_string())?;
        let mut positions = source.positions().to_vec();
        let deform_diag = deform(&data, deformed, &mut positions, 1.0, None).map_err(|e| e.to_string())?;
        source.set_positions(positions).map_err(|e| e.to_string())?;
        Ok(ScenarioOutput {
            name,
            mesh: source,
            bind: bind_diag,
            deform: deform_diag,
        })
    }

    fn map_positions(mesh: &PolyMesh, f: impl Fn(Point3) -> Point3) -> PolyMesh {
        let mut out = mesh.clone();
        let moved = mesh.positions().iter().map(|&p| f(p)).collect();
        // Same vertex count, cannot fail.
        let _ = out.set_positions(moved);
        out
    }

    fn grid_mesh(nx: u32, ny: u32, cell: f64, z: f64) -> Result<PolyMesh, String> {
        let mut positions = Vec::new();
        for j in 0..=ny {
            for i in 0..=nx {
                positions.push(Point3::new(f64::from(i) * cell, f64::from(j) * cell, z));
            }
        }
        let mut polygons = Vec::new();
        for j in 0..ny {
            for i in 0..nx {
                let v = j * (nx + 1) + i;
                polygons.push([v, v + 1, v + nx + 2, v + nx + 1]);
            }
        }
        PolyMesh::from_polygons(positions, &polygons).map_err(|e| e.to_string())
    }

    /// Axis-aligned cube of half size `half`, each side split into `n` x `n`
    /// quads. Sides do not share vertices.
    fn cube_mesh(n: u32, half: f64) -> Result<PolyMesh, String> {
        let sides = [
            (Vec3::new(-1.0, -1.0, -1.0), Vec3::Y, Vec3::X),
            (Vec3::new(-1.0, -1.0, 1.0), Vec3::X, Vec3::Y),
            (Vec3::new(-1.0, -1.0, -1.0), Vec3::X, Vec3::Z),
            (Vec3::new(-1.0, 1.0, -1.0), Vec3::Z, Vec3::X),
            (Vec3::new(-1.0, -1.0, -1.0), Vec3::Z, Vec3::Y),
            (Vec3::new(1.0, -1.0, -1.0), Vec3::Y, Vec3::Z),
        ];
        let step = 2.0 / f64::from(n);

        let mut positions = Vec::new();
        let mut polygons = Vec::new();
        for (origin, u, v) in sides {
            let base = positions.len() as u32;
            for j in 0..=n {
                for i in 0..=n {
                    let p = origin + u * (f64::from(i) * step) + v * (f64::from(j) * step);
                    positions.push(Point3::new(p.x * half, p.y * half, p.z * half));
                }
            }
            for j in 0..n {
                for i in 0..n {
                    let q = base + j * (n + 1) + i;
                    polygons.push([q, q + 1, q + n + 2, q + n + 1]);
                }
            }
        }

        if n == 1 {
            return weld_cube(positions, &polygons);
        }
        PolyMesh::from_polygons(positions, &polygons).map_err(|e| e.to_string())
    }

    /// Merges coincident corners so the single-quad cube is a closed cage.
    fn weld_cube(positions: Vec<Point3>, polygons: &[[u32; 4]]) -> Result<PolyMesh, String> {
        let mut unique: Vec<Point3> = Vec::new();
        let mut remap = Vec::with_capacity(positions.len());
        for p in positions {
            let index = match unique.iter().position(|u| u.distance_to(p) < 1e-12) {
                Some(index) => index,
                None => {
                    unique.push(p);
                    unique.len() - 1
                }
            };
            remap.push(index as u32);
        }
        let welded: Vec<[u32; 4]> = polygons
            .iter()
            .map(|poly| poly.map(|v| remap[v as usize]))
            .collect();
        PolyMesh::from_polygons(unique, &welded).map_err(|e| e.to_string())
    }

    struct Args {
        args: Vec<String>,
        pos: usize,
    }

    impl Args {
        fn new(args: Vec<String>) -> Self {
            Self { args, pos: 0 }
        }

        fn next(&mut self) -> Option<String> {
            let arg = self.args.get(self.pos)?.clone();
            self.pos += 1;
            Some(arg)
        }

        fn value(&mut self, flag: &str) -> Result<String, String> {
            self.next().ok_or_else(|| format!("missing value for {flag}"))
        }
    }
}
