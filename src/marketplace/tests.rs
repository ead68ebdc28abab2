//! Unit tests for the marketplace client.

use super::*;
use crate::test_support::{ScriptedRunner, json_instance, json_offers};
use rstest::{fixture, rstest};

#[fixture]
fn query() -> OfferQuery {
    OfferQuery {
        gpu_name: String::from("RTX_3060"),
        num_gpus: 1,
        min_cpu_ram_gb: 16,
        max_dph: 0.2,
        min_cuda_version: 12.8,
        min_disk_gb: 16,
    }
}

fn instance_id(raw: &str) -> InstanceId {
    InstanceId::parse(raw).unwrap_or_else(|| panic!("{raw} should be a valid id"))
}

#[rstest]
fn search_offers_orders_by_price_and_parses_records(query: OfferQuery) {
    let runner = ScriptedRunner::new();
    runner.push_stdout(json_offers(&[(123, "RTX_3060", 0.09), (124, "RTX_3060", 0.11)]));
    let marketplace = Marketplace::new(DEFAULT_VASTAI_BIN, runner.clone());

    let offers = marketplace.search_offers(&query).expect("search should succeed");

    assert_eq!(
        offers.iter().map(|offer| offer.id).collect::<Vec<_>>(),
        vec![Some(123), Some(124)]
    );
    let invocations = runner.invocations();
    let call = invocations.first().expect("one invocation");
    assert_eq!(call.program, "vastai");
    assert_eq!(
        call.command_string(),
        concat!(
            "vastai search offers gpu_name=RTX_3060 num_gpus=1 cpu_ram>=16 dph_total<0.2 ",
            "cuda_vers>=12.8 disk_space>=16 --order dph_total --raw"
        )
    );
}

#[rstest]
fn search_offers_treats_null_numbers_as_zero(query: OfferQuery) {
    let runner = ScriptedRunner::new();
    runner.push_stdout(concat!(
        r#"[{"id":1,"gpu_name":"RTX_3060","dph_total":0.09,"dlperf":null},"#,
        r#"{"id":2,"gpu_name":"RTX_3060","dph_total":0.1,"inet_up":null,"inet_down":null,"#,
        r#""cuda_max_good":null,"num_gpus":null}]"#
    ));
    let marketplace = Marketplace::new(DEFAULT_VASTAI_BIN, runner);

    let offers = marketplace.search_offers(&query).expect("search should succeed");

    assert_eq!(offers.len(), 2);
    let second = offers.get(1).expect("second offer");
    assert_eq!(second.id, Some(2));
    assert_eq!(second.num_gpus, 0);
    assert_eq!(second.inet_up.to_string(), "0");
    assert_eq!(second.cuda_max_good.to_string(), "0");
    assert_eq!(offers.first().map(|offer| offer.dlperf.to_string()), Some(String::from("0")));
}

#[rstest]
#[case("[]")]
#[case("[{\"gpu_name\":\"RTX_3060\",\"dph_total\":0.1}]")]
fn search_offers_rejects_empty_or_anonymous_results(query: OfferQuery, #[case] stdout: &str) {
    let runner = ScriptedRunner::new();
    runner.push_stdout(stdout);
    let marketplace = Marketplace::new(DEFAULT_VASTAI_BIN, runner);

    let err = marketplace.search_offers(&query).expect_err("search should fail");

    assert_eq!(
        err,
        MarketplaceError::NoOffers {
            gpu_name: String::from("RTX_3060")
        }
    );
}

#[rstest]
fn search_offers_surfaces_cli_failures(query: OfferQuery) {
    let runner = ScriptedRunner::new();
    runner.push_failure(1, "invalid api key");
    let marketplace = Marketplace::new(DEFAULT_VASTAI_BIN, runner);

    let err = marketplace.search_offers(&query).expect_err("search should fail");

    let MarketplaceError::Command(RunnerError::NonZeroExit { stderr, status, .. }) = err else {
        panic!("expected NonZeroExit, got {err:?}");
    };
    assert_eq!(stderr, "invalid api key");
    assert_eq!(status, Some(1));
}

#[rstest]
fn search_offers_surfaces_parse_failures(query: OfferQuery) {
    let runner = ScriptedRunner::new();
    runner.push_stdout("not-json");
    let marketplace = Marketplace::new(DEFAULT_VASTAI_BIN, runner);

    let err = marketplace.search_offers(&query).expect_err("search should fail");
    assert!(matches!(err, MarketplaceError::Parse { ref resource, .. } if resource == "search offers"));
}

#[rstest]
fn search_offers_validates_before_running(query: OfferQuery) {
    let runner = ScriptedRunner::new();
    let marketplace = Marketplace::new(DEFAULT_VASTAI_BIN, runner.clone());

    let err = marketplace
        .search_offers(&OfferQuery {
            num_gpus: 0,
            ..query
        })
        .expect_err("zero GPUs should be rejected");

    assert!(matches!(err, MarketplaceError::InvalidQuery(_)));
    assert!(runner.invocations().is_empty());
}

#[rstest]
fn create_instance_passes_manifest_and_flags() {
    let runner = ScriptedRunner::new();
    runner.push_stdout("{\"success\": true, \"new_contract\": 456}");
    let marketplace = Marketplace::new(DEFAULT_VASTAI_BIN, runner.clone());
    let request = CreateRequest::standard(123, "vastai/pytorch", 32, 1, "demo");

    let id = marketplace.create_instance(&request).expect("create should succeed");

    assert_eq!(id.as_str(), "456");
    let invocations = runner.invocations();
    let call = invocations.first().expect("one invocation");
    let args = call
        .args
        .iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    assert_eq!(
        args.get(..5),
        Some(
            &[
                String::from("create"),
                String::from("instance"),
                String::from("123"),
                String::from("--image"),
                String::from("vastai/pytorch"),
            ][..]
        )
    );
    for flag in ["--jupyter", "--ssh", "--direct", "--raw"] {
        assert!(args.iter().any(|arg| arg == flag), "missing {flag}");
    }
    let env_index = args.iter().position(|arg| arg == "--env").expect("--env present");
    let env_block = args.get(env_index + 1).expect("--env value");
    assert!(env_block.contains("-p 60001:60001/udp"), "got: {env_block}");
}

#[rstest]
#[case("{\"new_contract\": null}", "null")]
#[case("{\"new_contract\": \"null\"}", "null")]
#[case("{\"success\": false}", "null")]
fn create_instance_rejects_missing_contract(#[case] stdout: &str, #[case] raw: &str) {
    let runner = ScriptedRunner::new();
    runner.push_stdout(stdout);
    let marketplace = Marketplace::new(DEFAULT_VASTAI_BIN, runner);

    let err = marketplace
        .create_instance(&CreateRequest::standard(1, "img", 16, 1, "tag"))
        .expect_err("create should fail");

    assert_eq!(
        err,
        MarketplaceError::MissingInstanceId {
            raw: raw.to_owned()
        }
    );
}

#[rstest]
#[case("{}")]
#[case("null")]
fn show_instance_maps_empty_records_to_none(#[case] stdout: &str) {
    let runner = ScriptedRunner::new();
    runner.push_stdout(stdout);
    let marketplace = Marketplace::new(DEFAULT_VASTAI_BIN, runner);

    let details = marketplace
        .show_instance(&instance_id("789"))
        .expect("show should succeed");
    assert_eq!(details, None);
}

#[rstest]
fn show_instance_parses_networking() {
    let runner = ScriptedRunner::new();
    runner.push_stdout(json_instance(Some("1.2.3.4"), Some(40022), None));
    let marketplace = Marketplace::new(DEFAULT_VASTAI_BIN, runner);

    let details = marketplace
        .show_instance(&instance_id("789"))
        .expect("show should succeed")
        .expect("record present");
    assert_eq!(details.public_ip(), Some("1.2.3.4"));
    assert_eq!(details.ssh_host_port(), Some(40022));
}

#[rstest]
#[case(Some(0), "ssh://root@1.2.3.4:5555\n", Some("ssh://root@1.2.3.4:5555"))]
#[case(Some(0), "\"ssh://root@1.2.3.4:5555\"", Some("ssh://root@1.2.3.4:5555"))]
#[case(Some(0), "   \n", None)]
#[case(Some(1), "", None)]
fn ssh_url_treats_failures_as_not_ready(
    #[case] code: Option<i32>,
    #[case] stdout: &str,
    #[case] expected: Option<&str>,
) {
    let runner = ScriptedRunner::new();
    runner.push_output(code, stdout, "instance not running");
    let marketplace = Marketplace::new(DEFAULT_VASTAI_BIN, runner);

    let uri = marketplace
        .ssh_url(&instance_id("456"))
        .expect("ssh-url should not error");
    assert_eq!(uri.as_deref(), expected);
}

#[rstest]
fn destroy_and_attach_return_raw_output() {
    let runner = ScriptedRunner::new();
    runner.push_failure(1, "failed with error 404: not found");
    runner.push_failure(2, "bad key");
    let marketplace = Marketplace::new(DEFAULT_VASTAI_BIN, runner.clone());
    let id = instance_id("456");

    let destroy = marketplace.destroy_instance(&id).expect("destroy output");
    let attach = marketplace
        .attach_ssh_key(&id, "ssh-ed25519 AAAA test")
        .expect("attach output");

    assert_eq!(destroy.code, Some(1));
    assert_eq!(attach.stderr, "bad key");
    assert_eq!(runner.count_calls(&["destroy", "instance", "456"]), 1);
    assert_eq!(runner.count_calls(&["attach", "ssh", "456", "ssh-ed25519 AAAA test"]), 1);
}
